//! In-memory transfer engine.
//!
//! Serves registered transfers straight from memory (or from local files),
//! with no networking involved. Descriptors for transfers that were never
//! registered behave like a swarm without peers: their metadata never
//! arrives. Every priority change, reader and release is recorded so tests
//! can assert on how the session layer drives the engine.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};

use self::file::{MemoryFile, collect_files};
use super::{EngineError, FilePriority, InfoHash, TransferEngine, TransferFile, TransferHandle};
use crate::magnet::{magnet_uri, parse_magnet_link};

mod file;

/// Backing storage for one file of a memory transfer.
#[derive(Debug, Clone)]
enum FileSource {
    Memory(Bytes),
    Zeroes,
    Disk(PathBuf),
}

#[derive(Debug, Clone)]
struct MemoryFileSpec {
    path: String,
    length: u64,
    source: FileSource,
}

/// A transfer the memory engine can serve.
#[derive(Debug, Clone)]
pub struct MemoryTransfer {
    name: String,
    info_hash: InfoHash,
    files: Vec<MemoryFileSpec>,
}

impl MemoryTransfer {
    /// Creates an empty transfer whose info hash is the SHA-1 of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&Sha1::digest(name.as_bytes()));
        Self {
            name,
            info_hash: InfoHash::new(digest),
            files: Vec::new(),
        }
    }

    /// Appends an in-memory file.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        self.files.push(MemoryFileSpec {
            path: path.into(),
            length: content.len() as u64,
            source: FileSource::Memory(content),
        });
        self
    }

    /// Appends a file of `length` zero bytes that is never allocated.
    pub fn with_sized_file(mut self, path: impl Into<String>, length: u64) -> Self {
        self.files.push(MemoryFileSpec {
            path: path.into(),
            length,
            source: FileSource::Zeroes,
        });
        self
    }

    fn with_disk_file(mut self, path: String, disk_path: PathBuf, length: u64) -> Self {
        self.files.push(MemoryFileSpec {
            path,
            length,
            source: FileSource::Disk(disk_path),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Magnet URI that resolves to this transfer.
    pub fn magnet(&self) -> String {
        magnet_uri(self.info_hash, &self.name)
    }
}

/// Snapshot of a reader opened through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderRecord {
    pub info_hash: InfoHash,
    pub path: String,
    pub readahead: Option<u64>,
    pub responsive: bool,
}

/// Counters recorded by the memory engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngineStats {
    /// Successful `add_descriptor` calls per transfer.
    pub adds: HashMap<InfoHash, usize>,
    /// `release` calls per transfer.
    pub releases: HashMap<InfoHash, usize>,
}

impl MemoryEngineStats {
    pub fn adds(&self, info_hash: InfoHash) -> usize {
        self.adds.get(&info_hash).copied().unwrap_or(0)
    }

    pub fn releases(&self, info_hash: InfoHash) -> usize {
        self.releases.get(&info_hash).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct EngineState {
    transfers: HashMap<InfoHash, Arc<MemoryTransfer>>,
    failing_paths: HashMap<InfoHash, Vec<String>>,
    priorities: HashMap<(InfoHash, usize), FilePriority>,
    readers: Vec<Arc<Mutex<ReaderRecord>>>,
    stats: MemoryEngineStats,
}

struct EngineInner {
    state: Mutex<EngineState>,
    metadata_delay: Duration,
    data_dir: Option<PathBuf>,
}

/// Transfer engine that serves registered transfers from memory.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

impl MemoryEngine {
    /// Creates an engine that resolves metadata immediately.
    pub fn new() -> Self {
        Self::with_options(Duration::ZERO, None)
    }

    /// Creates an engine with a metadata delay and an optional scratch
    /// directory into which in-memory files are written on add.
    pub fn with_options(metadata_delay: Duration, data_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::default()),
                metadata_delay,
                data_dir,
            }),
        }
    }

    /// Registers a transfer so descriptors for it resolve.
    pub fn register(&self, transfer: MemoryTransfer) -> InfoHash {
        let info_hash = transfer.info_hash;
        self.inner
            .state
            .lock()
            .transfers
            .insert(info_hash, Arc::new(transfer));
        info_hash
    }

    /// Makes every read of `path` inside `info_hash` fail.
    pub fn fail_reads(&self, info_hash: InfoHash, path: impl Into<String>) {
        self.inner
            .state
            .lock()
            .failing_paths
            .entry(info_hash)
            .or_default()
            .push(path.into());
    }

    /// Registers every top-level entry of `dir` as a transfer.
    ///
    /// A plain file becomes a single-file transfer, a directory becomes a
    /// transfer containing every file below it. File contents stay on disk.
    ///
    /// # Errors
    /// - `std::io::Error` - Directory could not be listed
    pub fn seed_directory(&self, dir: &Path) -> io::Result<Vec<MemoryTransfer>> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut seeded = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let mut files = Vec::new();
            collect_files(&entry.path(), &name, &mut files)?;
            if files.is_empty() {
                continue;
            }

            let transfer = files
                .into_iter()
                .fold(MemoryTransfer::new(&name), |transfer, (path, disk, len)| {
                    transfer.with_disk_file(path, disk, len)
                });
            self.register(transfer.clone());
            seeded.push(transfer);
        }

        Ok(seeded)
    }

    pub fn stats(&self) -> MemoryEngineStats {
        self.inner.state.lock().stats.clone()
    }

    /// Latest priority requested for a file, if any.
    pub fn priority(&self, info_hash: InfoHash, index: usize) -> Option<FilePriority> {
        self.inner
            .state
            .lock()
            .priorities
            .get(&(info_hash, index))
            .copied()
    }

    /// Every reader opened so far, in order.
    pub fn readers(&self) -> Vec<ReaderRecord> {
        self.inner
            .state
            .lock()
            .readers
            .iter()
            .map(|record| record.lock().clone())
            .collect()
    }

    async fn materialize(&self, transfer: &MemoryTransfer) -> Result<(), EngineError> {
        let Some(data_dir) = &self.inner.data_dir else {
            return Ok(());
        };

        let root = data_dir.join(transfer.info_hash.to_string());
        for file in &transfer.files {
            if let FileSource::Memory(content) = &file.source {
                let target = root.join(&file.path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, content).await?;
            }
        }
        Ok(())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferEngine for MemoryEngine {
    async fn add_descriptor(
        &self,
        descriptor: &str,
    ) -> Result<Arc<dyn TransferHandle>, EngineError> {
        let magnet = parse_magnet_link(descriptor)?;
        let transfer = {
            let mut state = self.inner.state.lock();
            *state.stats.adds.entry(magnet.info_hash).or_default() += 1;
            state.transfers.get(&magnet.info_hash).cloned()
        };

        if let Some(transfer) = &transfer {
            self.materialize(transfer).await?;
        }

        Ok(Arc::new(MemoryHandle {
            info_hash: magnet.info_hash,
            transfer,
            engine: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        }))
    }
}

struct MemoryHandle {
    info_hash: InfoHash,
    transfer: Option<Arc<MemoryTransfer>>,
    engine: Arc<EngineInner>,
    released: AtomicBool,
}

#[async_trait]
impl TransferHandle for MemoryHandle {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn wait_for_metadata(&self) {
        if self.transfer.is_none() {
            std::future::pending::<()>().await;
        }
        if !self.engine.metadata_delay.is_zero() {
            tokio::time::sleep(self.engine.metadata_delay).await;
        }
    }

    fn display_name(&self) -> String {
        self.transfer
            .as_ref()
            .map(|transfer| transfer.name.clone())
            .unwrap_or_default()
    }

    fn files(&self) -> Vec<Arc<dyn TransferFile>> {
        let Some(transfer) = &self.transfer else {
            return Vec::new();
        };

        let failing = self
            .engine
            .state
            .lock()
            .failing_paths
            .get(&self.info_hash)
            .cloned()
            .unwrap_or_default();

        transfer
            .files
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                Arc::new(MemoryFile {
                    info_hash: self.info_hash,
                    index,
                    fail_reads: failing.contains(&spec.path),
                    spec: spec.clone(),
                    engine: Arc::clone(&self.engine),
                }) as Arc<dyn TransferFile>
            })
            .collect()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.engine.state.lock();
        *state.stats.releases.entry(self.info_hash).or_default() += 1;
    }
}
