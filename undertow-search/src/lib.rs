//! Undertow Search - Remote subtitle search and download

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
//!
//! Finds subtitles for a session on an external service when the transfer
//! itself ships none (or the wrong language), and fetches the chosen file.

pub mod errors;
pub mod providers;
pub mod types;

// Re-export main types
pub use errors::SubtitleSearchError;
pub use providers::{MockSubtitleProvider, OpenSubtitlesProvider, SubtitleProvider};
pub use types::{DownloadedSubtitle, SubtitleSearchResult};

/// Convenience type alias for Results with SubtitleSearchError.
pub type Result<T> = std::result::Result<T, SubtitleSearchError>;
