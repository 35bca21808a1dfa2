//! Provider implementations for subtitle search.

use async_trait::async_trait;

use crate::errors::SubtitleSearchError;
use crate::types::{DownloadedSubtitle, SubtitleSearchResult};

pub mod mock;
pub mod opensubtitles;

pub use mock::MockSubtitleProvider;
pub use opensubtitles::OpenSubtitlesProvider;

/// Trait for subtitle search providers.
///
/// Implementations talk to a remote subtitle service (or serve canned data
/// for development and tests). Each call is a single attempt.
#[async_trait]
pub trait SubtitleProvider: Send + Sync + std::fmt::Debug {
    /// Searches subtitles matching `query` in `language`.
    ///
    /// # Errors
    /// - `SubtitleSearchError::NotConfigured` - Provider has no credentials
    /// - `SubtitleSearchError::Network` - Service unreachable
    /// - `SubtitleSearchError::Api` - Service returned a non-success status
    /// - `SubtitleSearchError::Parse` - Response body malformed
    async fn search(
        &self,
        query: &str,
        language: &str,
    ) -> Result<Vec<SubtitleSearchResult>, SubtitleSearchError>;

    /// Downloads the subtitle file identified by `file_id`.
    ///
    /// # Errors
    /// - `SubtitleSearchError::NotConfigured` - Provider has no credentials
    /// - `SubtitleSearchError::Network` - Service unreachable
    /// - `SubtitleSearchError::Api` - Service returned a non-success status
    /// - `SubtitleSearchError::Parse` - Response body malformed
    async fn download(&self, file_id: u64) -> Result<DownloadedSubtitle, SubtitleSearchError>;
}
