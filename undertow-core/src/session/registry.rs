//! Registry of live sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionError;
use super::files::FileEntry;
use super::state::Session;
use crate::config::SessionConfig;
use crate::engine::{InfoHash, TransferEngine, TransferHandle, TransferReader};
use crate::streaming::configure_reader;
use crate::subtitle::Subtitle;

/// Reader over the selected file, configured for playback.
pub struct FileStream {
    pub reader: Box<dyn TransferReader>,
    pub file: FileEntry,
    /// Read-ahead window applied to `reader`.
    pub readahead: u64,
}

/// Maps session identifiers to live sessions.
///
/// The map lock guards only membership and is never held across an await.
/// Per-session state has its own locks; the map lock is never taken while
/// one of those is held.
///
/// Adds hold `data_gate` shared and removals hold it exclusively, so a data
/// directory is never deleted while an add may be writing into it.
pub struct SessionRegistry {
    engine: Arc<dyn TransferEngine>,
    sessions: RwLock<HashMap<InfoHash, Arc<Session>>>,
    data_gate: tokio::sync::RwLock<()>,
    config: SessionConfig,
}

/// Releases an engine handle unless it was adopted by a session.
///
/// Covers timeouts, lost creation races and callers dropping the add future.
struct PendingHandle {
    handle: Arc<dyn TransferHandle>,
    armed: bool,
}

impl PendingHandle {
    fn new(handle: Arc<dyn TransferHandle>) -> Self {
        Self {
            handle,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        if self.armed {
            debug!(info_hash = %self.handle.info_hash(), "Releasing pending transfer handle");
            self.handle.release();
        }
    }
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn TransferEngine>, config: SessionConfig) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            data_gate: tokio::sync::RwLock::new(()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Adds the transfer described by `descriptor`, or returns the existing
    /// session for the same identifier.
    ///
    /// Waits for metadata up to the configured timeout. Dropping the returned
    /// future releases the engine handle obtained so far.
    ///
    /// # Errors
    /// - `SessionError::Engine` - Descriptor rejected by the engine
    /// - `SessionError::MetadataTimeout` - No metadata within the timeout
    pub async fn add_descriptor(&self, descriptor: &str) -> Result<Arc<Session>, SessionError> {
        let _gate = self.data_gate.read().await;
        let pending = PendingHandle::new(self.engine.add_descriptor(descriptor).await?);
        let info_hash = pending.handle.info_hash();

        if let Some(existing) = self.get(info_hash) {
            debug!(%info_hash, "Transfer already registered");
            existing.touch();
            return Ok(existing);
        }

        let waited = self.config.metadata_timeout;
        if tokio::time::timeout(waited, pending.handle.wait_for_metadata())
            .await
            .is_err()
        {
            warn!(%info_hash, ?waited, "Timed out waiting for metadata");
            return Err(SessionError::MetadataTimeout { info_hash, waited });
        }

        let session = Arc::new(Session::from_handle(Arc::clone(&pending.handle)));
        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(&info_hash) {
                let existing = Arc::clone(existing);
                drop(sessions);
                debug!(%info_hash, "Lost creation race, using existing session");
                existing.touch();
                return Ok(existing);
            }
            sessions.insert(info_hash, Arc::clone(&session));
        }
        pending.disarm();

        info!(
            %info_hash,
            name = session.name(),
            files = session.files().len(),
            "Added session"
        );
        Ok(session)
    }

    /// Looks up a session and refreshes its access time.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - No session for `info_hash`
    pub fn lookup(&self, info_hash: InfoHash) -> Result<Arc<Session>, SessionError> {
        let session = self
            .get(info_hash)
            .ok_or(SessionError::NotFound { info_hash })?;
        session.touch();
        Ok(session)
    }

    fn get(&self, info_hash: InfoHash) -> Option<Arc<Session>> {
        self.sessions.read().get(&info_hash).cloned()
    }

    /// Selects a file for playback and rebuilds the session's subtitles.
    ///
    /// Reads every subtitle file of the transfer, so this can take as long as
    /// fetching them does.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - No session for `info_hash`
    /// - `SessionError::OutOfRange` - `file_index` is negative or too large
    pub async fn select_file(
        &self,
        info_hash: InfoHash,
        file_index: i64,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.lookup(info_hash)?;
        let file = session.select(file_index).await?;
        info!(%info_hash, path = %file.path, "Selected file");
        Ok(session)
    }

    /// Opens a reader over the selected file with read-ahead configured for
    /// its size.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - No session for `info_hash`
    /// - `SessionError::NoSelection` - Nothing selected yet
    pub async fn stream_reader(&self, info_hash: InfoHash) -> Result<FileStream, SessionError> {
        let session = self.lookup(info_hash)?;
        let file = session
            .selected()
            .await
            .ok_or(SessionError::NoSelection { info_hash })?;
        let engine_file = session
            .engine_file(file.index)
            .ok_or(SessionError::NoSelection { info_hash })?;

        let mut reader = engine_file.new_reader();
        let readahead = configure_reader(reader.as_mut(), file.length);

        Ok(FileStream {
            reader,
            file,
            readahead,
        })
    }

    /// Attaches an uploaded or downloaded subtitle to a session.
    ///
    /// SRT content is converted and renamed to `.vtt`. The track gets the
    /// next external sequence of the session.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - No session for `info_hash`
    pub async fn attach_subtitle(
        &self,
        info_hash: InfoHash,
        file_name: &str,
        content: &[u8],
    ) -> Result<Subtitle, SessionError> {
        let session = self.lookup(info_hash)?;
        let subtitle = session.attach(file_name, content).await;
        info!(%info_hash, name = %subtitle.name, index = %subtitle.source, "Attached subtitle");
        Ok(subtitle)
    }

    /// Content of a subtitle track by its wire index.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - No session for `info_hash`
    /// - `SessionError::SubtitleNotFound` - No track with that index
    pub async fn subtitle_content(
        &self,
        info_hash: InfoHash,
        wire_index: i64,
    ) -> Result<Bytes, SessionError> {
        let session = self.lookup(info_hash)?;
        session
            .subtitle_content(wire_index)
            .await
            .ok_or(SessionError::SubtitleNotFound {
                info_hash,
                index: wire_index,
            })
    }

    /// All live sessions, oldest first.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|session| session.added_at());
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Removes one session, releasing its transfer and deleting its data
    /// directory. Returns whether a session was present.
    ///
    /// Waits for adds in flight to settle first, so the directory deleted is
    /// never one a newer session of the same transfer is filling.
    ///
    /// # Errors
    /// - `SessionError::Io` - Data directory exists but could not be deleted
    pub async fn remove(&self, info_hash: InfoHash) -> Result<bool, SessionError> {
        let _gate = self.data_gate.write().await;
        let removed = self.sessions.write().remove(&info_hash);
        let Some(session) = removed else {
            return Ok(false);
        };

        session.release();
        let dir = self.config.data_dir.join(info_hash.to_string());
        remove_path(&dir).await?;

        info!(%info_hash, name = session.name(), "Removed session");
        Ok(true)
    }

    /// Releases every session and empties the data directory.
    ///
    /// Every entry is attempted; the first deletion failure is returned.
    ///
    /// # Errors
    /// - `SessionError::Io` - Data directory could not be listed or emptied
    pub async fn remove_all(&self) -> Result<(), SessionError> {
        let _gate = self.data_gate.write().await;
        let drained: Vec<Arc<Session>> = self
            .sessions
            .write()
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in &drained {
            session.release();
        }
        info!(count = drained.len(), "Released all sessions");

        let mut entries = match tokio::fs::read_dir(&self.config.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut first_error = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Err(e) = remove_path(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete data entry");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Removes every session idle for longer than `max_age`. Returns the
    /// identifiers that were removed.
    pub async fn sweep(&self, max_age: Duration) -> Vec<InfoHash> {
        let stale: Vec<InfoHash> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.is_stale(max_age))
            .map(|session| session.info_hash())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for info_hash in stale {
            match self.remove(info_hash).await {
                Ok(true) => removed.push(info_hash),
                Ok(false) => {}
                Err(e) => {
                    // The map entry is already gone at this point.
                    warn!(%info_hash, error = %e, "Failed to clean up stale session");
                    removed.push(info_hash);
                }
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "Swept stale sessions");
        }
        removed
    }

    /// Runs `sweep(max_age)` every `interval` until `cancel` fires. The first
    /// sweep happens one full interval after the call.
    pub async fn sweep_loop(
        &self,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sweep loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep(max_age).await;
                }
            }
        }
    }

    /// Spawns [`SessionRegistry::sweep_loop`] with the configured interval and
    /// max age.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let interval = registry.config.sweep_interval;
            let max_age = registry.config.max_age;
            registry.sweep_loop(interval, max_age, cancel).await;
        })
    }
}

/// Deletes a file or directory tree. A missing path is not an error.
async fn remove_path(path: &Path) -> std::io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
