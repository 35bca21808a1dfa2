//! Error types for remote subtitle search.

use thiserror::Error;

/// Errors that can occur while talking to a subtitle service.
#[derive(Debug, Error)]
pub enum SubtitleSearchError {
    /// No API key was configured for the service.
    #[error("OpenSubtitles API key not configured")]
    NotConfigured,

    /// The request never produced a response.
    #[error("Network error: {reason}")]
    Network {
        /// The reason for the network error
        reason: String,
    },

    /// The service answered with a non-success status.
    #[error("OpenSubtitles API error {status}: {body}")]
    Api {
        /// HTTP status code returned by the service
        status: u16,
        /// Start of the response body, at most 1 KiB
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Parse error: {reason}")]
    Parse {
        /// The reason for the parse error
        reason: String,
    },
}

impl From<reqwest::Error> for SubtitleSearchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Parse {
                reason: error.to_string(),
            }
        } else {
            Self::Network {
                reason: error.to_string(),
            }
        }
    }
}
