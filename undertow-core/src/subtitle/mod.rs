//! Subtitle tracks attached to a session.
//!
//! Tracks come from two places: subtitle files inside the transfer itself,
//! and files supplied from outside (uploads, remote subtitle search). All of
//! them are stored already normalized to WebVTT when the source was SRT.

pub mod convert;
pub mod matcher;

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Serialize, Serializer};

pub use convert::srt_to_vtt;
pub use matcher::{MatchClass, classify, partition};

/// Where a subtitle track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtitleSource {
    /// A file of the transfer, identified by its ordinal.
    Native { file_index: usize },
    /// Uploaded or downloaded from a subtitle service. Sequences start at 1.
    External { sequence: u32 },
}

impl SubtitleSource {
    /// Numeric identifier used in URLs: native tracks keep their file
    /// ordinal, external tracks are numbered -1, -2, ...
    pub fn wire_index(self) -> i64 {
        match self {
            Self::Native { file_index } => file_index as i64,
            Self::External { sequence } => -i64::from(sequence),
        }
    }

    /// Inverse of [`SubtitleSource::wire_index`].
    pub fn from_wire_index(index: i64) -> Option<Self> {
        if index >= 0 {
            usize::try_from(index)
                .ok()
                .map(|file_index| Self::Native { file_index })
        } else {
            index
                .checked_neg()
                .and_then(|sequence| u32::try_from(sequence).ok())
                .map(|sequence| Self::External { sequence })
        }
    }
}

impl fmt::Display for SubtitleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_index())
    }
}

impl Serialize for SubtitleSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.wire_index())
    }
}

/// One caption track available for the current selection.
#[derive(Debug, Clone)]
pub struct Subtitle {
    pub name: String,
    pub source: SubtitleSource,
    pub content: Bytes,
}

/// Caption formats recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    WebVtt,
    Other,
}

impl SubtitleFormat {
    /// Detects the format from the extension of `path`, case-insensitively.
    pub fn from_path(path: &str) -> Self {
        match extension(path).as_deref() {
            Some("srt") => Self::Srt,
            Some("vtt") => Self::WebVtt,
            _ => Self::Other,
        }
    }
}

/// Lowercased extension of `path`, without the dot.
pub(crate) fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Normalizes subtitle content for serving.
///
/// SRT content is converted to WebVTT and, when `rename` is set, the name's
/// extension is switched to `.vtt`. Other formats are returned untouched.
pub fn normalize(name: &str, content: &[u8], rename: bool) -> (String, Bytes) {
    match SubtitleFormat::from_path(name) {
        SubtitleFormat::Srt => {
            let name = if rename {
                Path::new(name)
                    .with_extension("vtt")
                    .to_string_lossy()
                    .into_owned()
            } else {
                name.to_string()
            };
            (name, Bytes::from(srt_to_vtt(content)))
        }
        _ => (name.to_string(), Bytes::copy_from_slice(content)),
    }
}
