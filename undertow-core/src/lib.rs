//! Undertow Core - Session lifecycle and subtitle handling
//!
//! This crate tracks the transfers a user is watching, decides which file of
//! each transfer gets bandwidth, prepares subtitles for the selected file, and
//! hands out readers tuned for streaming. The transfer protocol itself lives
//! behind the traits in [`engine`].

pub mod config;
pub mod engine;
pub mod magnet;
pub mod mode;
pub mod session;
pub mod streaming;
pub mod subtitle;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use engine::{EngineError, InfoHash, MemoryEngine, TransferEngine};
pub use mode::RuntimeMode;
pub use session::{Session, SessionError, SessionRegistry};

/// Core errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Session(e) => e.user_message(),
            UndertowError::Engine(EngineError::InvalidDescriptor { reason }) => {
                format!("invalid magnet link: {reason}")
            }
            UndertowError::Engine(_) => "download error occurred".to_string(),
            UndertowError::Configuration { reason } => format!("configuration error: {reason}"),
            UndertowError::Io(_) => "file system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Session(
                SessionError::OutOfRange { .. }
                    | SessionError::NoSelection { .. }
                    | SessionError::InvalidIdentifier { .. }
                    | SessionError::Engine(EngineError::InvalidDescriptor { .. })
            ) | UndertowError::Engine(EngineError::InvalidDescriptor { .. })
                | UndertowError::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_timeout_user_message() {
        let err = UndertowError::from(SessionError::MetadataTimeout {
            info_hash: InfoHash::new([0; 20]),
            waited: Duration::from_secs(60),
        });
        assert_eq!(err.user_message(), "metadata timeout — no peers found");
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_user_errors() {
        let err = UndertowError::from(SessionError::OutOfRange {
            index: -1,
            file_count: 2,
        });
        assert!(err.is_user_error());

        let err = UndertowError::from(EngineError::InvalidDescriptor {
            reason: "bad".to_string(),
        });
        assert!(err.is_user_error());
        assert_eq!(err.user_message(), "invalid magnet link: bad");
    }
}
