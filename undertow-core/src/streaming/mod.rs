//! Reader configuration for media streaming.
//!
//! Playback reads a file sequentially from wherever the player seeked to, so
//! readers handed out for streaming prefetch a window ahead of the read
//! position and ask the engine for responsive piece scheduling.

pub mod readahead;

pub use readahead::{
    DEFAULT_READAHEAD, LARGE_FILE_READAHEAD, LARGE_FILE_THRESHOLD, MEDIUM_FILE_READAHEAD,
    MEDIUM_FILE_THRESHOLD, configure_reader, readahead_for,
};
