//! Contract with the external transfer engine.
//!
//! The session registry never speaks the peer wire protocol itself. It drives
//! whatever engine is plugged in through these traits: add a transfer from a
//! descriptor, wait for its metadata, list its files, adjust per-file
//! priorities, open streaming readers, and release the transfer when done.

pub mod memory;
pub mod rqbit;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncSeek};

pub use memory::{MemoryEngine, MemoryEngineStats, MemoryTransfer, ReaderRecord};
pub use rqbit::{RqbitEngine, RqbitOptions};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary. Used as the session identifier
/// and as the name of the session's scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for InfoHash {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(s, &mut hash).map_err(|e| EngineError::InvalidDescriptor {
            reason: format!("invalid info hash '{s}': {e}"),
        })?;
        Ok(Self(hash))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Download priority hint for a single file inside a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePriority {
    /// Do not fetch any pieces of this file.
    None,
    /// Regular scheduling.
    Normal,
    /// Fetch ahead of everything else.
    Immediate,
}

/// Errors reported by a transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Engine rejected transfer: {reason}")]
    Rejected { reason: String },

    #[error("Read failed for {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine has shut down")]
    Shutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Entry point of a transfer engine.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Starts (or joins) the transfer described by `descriptor`.
    ///
    /// Every call yields an independent handle. Releasing one handle must not
    /// tear down a transfer that another handle still refers to.
    ///
    /// # Errors
    /// - `EngineError::InvalidDescriptor` - Descriptor could not be parsed
    /// - `EngineError::Rejected` - Engine refused the transfer
    async fn add_descriptor(&self, descriptor: &str)
    -> Result<Arc<dyn TransferHandle>, EngineError>;
}

/// One transfer as seen through the engine.
#[async_trait]
pub trait TransferHandle: Send + Sync {
    /// Stable identifier derived from the descriptor.
    fn info_hash(&self) -> InfoHash;

    /// Resolves once file metadata is available.
    ///
    /// Never resolves if no peer ever delivers the metadata; callers bound it
    /// with a timeout.
    async fn wait_for_metadata(&self);

    /// Display name of the transfer. Only meaningful after metadata arrived.
    fn display_name(&self) -> String;

    /// Files in their stable ordinal order. Empty before metadata arrived.
    fn files(&self) -> Vec<Arc<dyn TransferFile>>;

    /// Releases engine-side resources held by this handle.
    fn release(&self);
}

/// A single file inside a transfer.
pub trait TransferFile: Send + Sync {
    /// Path of the file relative to the transfer root, `/` separated.
    fn path(&self) -> String;

    /// Length in bytes.
    fn length(&self) -> u64;

    /// Changes the download priority for this file.
    fn set_priority(&self, priority: FilePriority);

    /// Opens a seekable reader positioned at the start of the file.
    fn new_reader(&self) -> Box<dyn TransferReader>;
}

/// Streaming reader over a transfer file.
///
/// Reads block until the underlying pieces are available.
pub trait TransferReader: AsyncRead + AsyncSeek + Send + Unpin {
    /// Sets how many bytes past the read position the engine should prefetch.
    fn set_readahead(&mut self, bytes: u64);

    /// Favors the next bytes needed for sequential playback over
    /// rarest-first piece selection.
    fn set_responsive(&mut self);
}
