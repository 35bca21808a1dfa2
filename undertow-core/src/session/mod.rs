//! Session lifecycle management.
//!
//! A session is one transfer the user is watching. The registry creates
//! sessions from descriptors, drives file and subtitle selection, hands out
//! configured streaming readers, and reclaims sessions nobody touched for a
//! while.

pub mod files;
pub mod registry;
pub mod state;

use std::time::Duration;

pub use files::{FileEntry, classify_files};
pub use registry::{FileStream, SessionRegistry};
pub use state::{Session, SessionSnapshot, SubtitleSummary};

use crate::engine::{EngineError, InfoHash};

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Metadata for {info_hash} not received within {waited:?}")]
    MetadataTimeout { info_hash: InfoHash, waited: Duration },

    #[error("Session not found: {info_hash}")]
    NotFound { info_hash: InfoHash },

    #[error("File index {index} out of range (session has {file_count} files)")]
    OutOfRange { index: i64, file_count: usize },

    #[error("No file selected in session {info_hash}")]
    NoSelection { info_hash: InfoHash },

    #[error("Subtitle {index} not found in session {info_hash}")]
    SubtitleNotFound { info_hash: InfoHash, index: i64 },

    #[error("Invalid session identifier: {value}")]
    InvalidIdentifier { value: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Short message suitable for API clients.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::MetadataTimeout { .. } => {
                "metadata timeout — no peers found".to_string()
            }
            SessionError::NotFound { .. } => "torrent not found".to_string(),
            SessionError::OutOfRange { index, file_count } => {
                format!("invalid file index {index} (torrent has {file_count} files)")
            }
            SessionError::NoSelection { .. } => "no file selected".to_string(),
            SessionError::SubtitleNotFound { .. } => "subtitle not found".to_string(),
            SessionError::InvalidIdentifier { value } => format!("invalid torrent id: {value}"),
            SessionError::Engine(EngineError::InvalidDescriptor { reason }) => {
                format!("invalid magnet link: {reason}")
            }
            SessionError::Engine(_) => "download error occurred".to_string(),
            SessionError::Io(_) => "file system error occurred".to_string(),
        }
    }
}

/// Parses a session identifier as it appears in URLs.
///
/// # Errors
/// - `SessionError::InvalidIdentifier` - Not 40 hex characters
pub fn parse_session_id(raw: &str) -> Result<InfoHash, SessionError> {
    raw.to_ascii_lowercase()
        .parse()
        .map_err(|_| SessionError::InvalidIdentifier {
            value: raw.to_string(),
        })
}
