//! HTTP request handlers organized by functionality

pub mod api;
pub mod error;
pub mod range;
pub mod streaming;
pub mod subtitles;

// Re-export handler functions
pub use api::{add_magnet, cleanup, list_torrents, remove_torrent, select_file};
pub use error::{ApiError, ApiResponse};
pub use streaming::{content_type_for, stream_file, subtitle_file};
pub use subtitles::{download_subtitle, search_subtitles, upload_subtitle};
