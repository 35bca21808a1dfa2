//! Data types for remote subtitle search.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One downloadable subtitle file offered by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleSearchResult {
    /// Identifier passed back to [`crate::SubtitleProvider::download`]
    pub file_id: u64,
    /// File name as published
    pub file_name: String,
    /// Language code, e.g. `en`
    pub language: String,
    /// Release the subtitle was timed against
    pub release: String,
    /// Community rating
    pub rating: f64,
    /// Download count
    pub downloads: u64,
}

/// Subtitle file fetched from a service.
#[derive(Debug, Clone)]
pub struct DownloadedSubtitle {
    /// File name reported by the service
    pub file_name: String,
    /// Raw file content, not yet normalized
    pub content: Bytes,
}
