//! Classification of transfer files by extension.

use serde::Serialize;

use crate::engine::TransferFile;
use crate::subtitle::extension;

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "m4v"];
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "vtt", "ass", "sub"];

/// Read-only description of one file inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Ordinal inside the transfer, stable for the transfer's lifetime.
    pub index: usize,
    pub path: String,
    pub length: u64,
    pub is_video: bool,
    pub is_subtitle: bool,
}

impl FileEntry {
    /// Builds an entry, deriving the media flags from the extension.
    pub fn new(index: usize, path: impl Into<String>, length: u64) -> Self {
        let path = path.into();
        let ext = extension(&path);
        let has_ext = |set: &[&str]| ext.as_deref().is_some_and(|ext| set.contains(&ext));

        Self {
            index,
            is_video: has_ext(VIDEO_EXTENSIONS),
            is_subtitle: has_ext(SUBTITLE_EXTENSIONS),
            path,
            length,
        }
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Classifies every engine file once, preserving ordinal order.
pub fn classify_files(files: &[std::sync::Arc<dyn TransferFile>]) -> Vec<FileEntry> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| FileEntry::new(index, file.path(), file.length()))
        .collect()
}
