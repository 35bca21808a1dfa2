//! Transfer engine backed by a librqbit session.
//!
//! Magnet links resolve over DHT and trackers in the background. Handles for
//! the same info hash share one managed torrent, which is dropped from the
//! session together with its files once the last handle is released. Each
//! torrent downloads into `<data_dir>/<info_hash>/` and starts with no file
//! wanted, so nothing is fetched until a file gets a priority.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use librqbit::api::TorrentIdOrHash;
use librqbit::dht::Id20;
use librqbit::{
    AddTorrent, AddTorrentOptions, ManagedTorrent, Session as TorrentSession, SessionOptions,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::file::RqbitFile;
use super::{EngineError, InfoHash, TransferEngine, TransferFile, TransferHandle};
use crate::magnet::parse_magnet_link;

mod file;

/// Settings for the underlying librqbit session.
#[derive(Debug, Clone, Default)]
pub struct RqbitOptions {
    /// Resolve magnets through trackers only.
    pub disable_dht: bool,
    /// Ports tried for incoming peer connections. `None` accepts none.
    pub listen_ports: Option<Range<u16>>,
}

enum TorrentState {
    Resolving,
    Ready(Arc<ManagedTorrent>),
    Failed,
}

/// One torrent shared by every handle for its info hash.
struct SharedTorrent {
    info_hash: InfoHash,
    magnet_name: Option<String>,
    state: watch::Receiver<TorrentState>,
    /// File indices librqbit should download.
    wanted: Mutex<HashSet<usize>>,
    /// Serializes `update_only_files` calls so the latest set always lands last.
    wanted_sync: tokio::sync::Mutex<()>,
}

impl SharedTorrent {
    fn managed(&self) -> Option<Arc<ManagedTorrent>> {
        match &*self.state.borrow() {
            TorrentState::Ready(torrent) => Some(Arc::clone(torrent)),
            TorrentState::Resolving | TorrentState::Failed => None,
        }
    }
}

struct TorrentEntry {
    torrent: Arc<SharedTorrent>,
    resolver: JoinHandle<()>,
    refs: usize,
}

#[derive(Default)]
struct EngineState {
    torrents: HashMap<InfoHash, TorrentEntry>,
    /// Teardown of released torrents, awaited before the same hash is re-added.
    teardowns: HashMap<InfoHash, JoinHandle<()>>,
}

struct RqbitInner {
    session: Arc<TorrentSession>,
    runtime: tokio::runtime::Handle,
    data_dir: PathBuf,
    state: Mutex<EngineState>,
}

/// Transfer engine that fetches torrents from the swarm.
#[derive(Clone)]
pub struct RqbitEngine {
    inner: Arc<RqbitInner>,
}

impl RqbitEngine {
    /// Starts a librqbit session downloading below `data_dir`.
    ///
    /// # Errors
    /// - `EngineError::Rejected` - Session could not start (DHT or listener setup)
    pub async fn new(data_dir: PathBuf, options: RqbitOptions) -> Result<Self, EngineError> {
        let session_options = SessionOptions {
            disable_dht: options.disable_dht,
            disable_dht_persistence: true,
            listen_port_range: options.listen_ports,
            ..Default::default()
        };
        let session = TorrentSession::new_with_opts(data_dir.clone(), session_options)
            .await
            .map_err(|e| EngineError::Rejected {
                reason: format!("failed to start torrent session: {e:#}"),
            })?;
        info!(
            data_dir = %data_dir.display(),
            dht = !options.disable_dht,
            "Torrent session started"
        );

        Ok(Self {
            inner: Arc::new(RqbitInner {
                session,
                runtime: tokio::runtime::Handle::current(),
                data_dir,
                state: Mutex::new(EngineState::default()),
            }),
        })
    }

    /// Number of torrents with at least one live handle.
    pub fn active_torrents(&self) -> usize {
        self.inner.state.lock().torrents.len()
    }
}

impl RqbitInner {
    fn start(
        &self,
        info_hash: InfoHash,
        descriptor: &str,
        previous_teardown: Option<JoinHandle<()>>,
    ) -> (watch::Receiver<TorrentState>, JoinHandle<()>) {
        let (state_tx, state_rx) = watch::channel(TorrentState::Resolving);
        let session = Arc::clone(&self.session);
        let descriptor = descriptor.to_string();
        let options = AddTorrentOptions {
            overwrite: true,
            only_files: Some(Vec::new()),
            output_folder: Some(
                self.data_dir
                    .join(info_hash.to_string())
                    .to_string_lossy()
                    .into_owned(),
            ),
            ..Default::default()
        };

        let resolver = self.runtime.spawn(async move {
            if let Some(teardown) = previous_teardown {
                let _ = teardown.await;
            }
            let state = match resolve(&session, descriptor, options).await {
                Ok(torrent) => {
                    info!(%info_hash, name = ?torrent.name(), "Torrent metadata resolved");
                    TorrentState::Ready(torrent)
                }
                Err(e) => {
                    warn!(%info_hash, error = %format!("{e:#}"), "Failed to resolve torrent");
                    TorrentState::Failed
                }
            };
            state_tx.send_replace(state);
        });

        (state_rx, resolver)
    }

    fn release(&self, info_hash: InfoHash) {
        let mut state = self.state.lock();
        let Some(entry) = state.torrents.get_mut(&info_hash) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }
        let Some(entry) = state.torrents.remove(&info_hash) else {
            return;
        };

        let resolver = entry.resolver;
        resolver.abort();
        let session = Arc::clone(&self.session);
        let teardown = self.runtime.spawn(async move {
            // The resolver may have added the torrent before the abort landed.
            let _ = resolver.await;
            let id = TorrentIdOrHash::Hash(Id20::new(*info_hash.as_bytes()));
            match session.delete(id, true).await {
                Ok(()) => info!(%info_hash, "Torrent removed from session"),
                Err(e) => {
                    debug!(%info_hash, error = %format!("{e:#}"), "Torrent was not in session");
                }
            }
        });
        state.teardowns.insert(info_hash, teardown);
    }
}

async fn resolve(
    session: &Arc<TorrentSession>,
    descriptor: String,
    options: AddTorrentOptions,
) -> anyhow::Result<Arc<ManagedTorrent>> {
    let torrent = session
        .add_torrent(AddTorrent::from_url(descriptor), Some(options))
        .await?
        .into_handle()
        .ok_or_else(|| anyhow::anyhow!("torrent was only listed"))?;
    torrent.wait_until_initialized().await?;
    Ok(torrent)
}

#[async_trait]
impl TransferEngine for RqbitEngine {
    async fn add_descriptor(
        &self,
        descriptor: &str,
    ) -> Result<Arc<dyn TransferHandle>, EngineError> {
        let magnet = parse_magnet_link(descriptor)?;
        let info_hash = magnet.info_hash;

        let torrent = {
            let mut state = self.inner.state.lock();
            state.teardowns.retain(|_, teardown| !teardown.is_finished());
            if let Some(entry) = state.torrents.get_mut(&info_hash) {
                entry.refs += 1;
                Arc::clone(&entry.torrent)
            } else {
                let previous = state.teardowns.remove(&info_hash);
                let (state_rx, resolver) = self.inner.start(info_hash, descriptor, previous);
                let torrent = Arc::new(SharedTorrent {
                    info_hash,
                    magnet_name: magnet.display_name,
                    state: state_rx,
                    wanted: Mutex::new(HashSet::new()),
                    wanted_sync: tokio::sync::Mutex::new(()),
                });
                state.torrents.insert(
                    info_hash,
                    TorrentEntry {
                        torrent: Arc::clone(&torrent),
                        resolver,
                        refs: 1,
                    },
                );
                debug!(%info_hash, "Started resolving torrent");
                torrent
            }
        };

        Ok(Arc::new(RqbitHandle {
            torrent,
            engine: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        }))
    }
}

struct RqbitHandle {
    torrent: Arc<SharedTorrent>,
    engine: Arc<RqbitInner>,
    released: AtomicBool,
}

#[async_trait]
impl TransferHandle for RqbitHandle {
    fn info_hash(&self) -> InfoHash {
        self.torrent.info_hash
    }

    async fn wait_for_metadata(&self) {
        let mut state = self.torrent.state.clone();
        loop {
            let ready = matches!(*state.borrow_and_update(), TorrentState::Ready(_));
            if ready {
                return;
            }
            if state.changed().await.is_err() {
                break;
            }
        }
        // Resolution failed for good; only the caller's timeout ends this.
        std::future::pending::<()>().await;
    }

    fn display_name(&self) -> String {
        self.torrent
            .managed()
            .and_then(|torrent| torrent.name())
            .or_else(|| self.torrent.magnet_name.clone())
            .unwrap_or_else(|| self.torrent.info_hash.to_string())
    }

    fn files(&self) -> Vec<Arc<dyn TransferFile>> {
        let Some(torrent) = self.torrent.managed() else {
            return Vec::new();
        };

        let listed = torrent.with_metadata(|metadata| {
            let root = metadata
                .info
                .files
                .as_ref()
                .and(metadata.name.clone());
            metadata
                .file_infos
                .iter()
                .map(|info| (file_path(root.as_deref(), &info.relative_filename), info.len))
                .collect::<Vec<_>>()
        });

        listed
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, (path, length))| {
                Arc::new(RqbitFile {
                    index,
                    path,
                    length,
                    torrent: Arc::clone(&torrent),
                    shared: Arc::clone(&self.torrent),
                    engine: Arc::clone(&self.engine),
                }) as Arc<dyn TransferFile>
            })
            .collect()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.engine.release(self.torrent.info_hash);
    }
}

/// Joins a librqbit relative file name into a `/` separated transfer path,
/// prefixed with the torrent name for multi-file torrents.
fn file_path(root: Option<&str>, relative: &Path) -> String {
    let parts = relative.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.to_string_lossy()),
        _ => None,
    });
    root.map(std::borrow::Cow::Borrowed)
        .into_iter()
        .chain(parts)
        .collect::<Vec<_>>()
        .join("/")
}
