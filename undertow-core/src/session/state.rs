//! A single managed transfer and its mutable selection state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::SessionError;
use super::files::{FileEntry, classify_files};
use crate::engine::{FilePriority, InfoHash, TransferFile, TransferHandle};
use crate::subtitle::{self, Subtitle, SubtitleSource, partition};

/// Mutable part of a session, guarded by the session lock.
#[derive(Debug, Default)]
struct SelectionState {
    selected: Option<usize>,
    subtitles: Vec<Subtitle>,
    /// Next sequence handed to an external subtitle. Never reset.
    next_external: u32,
}

/// One managed transfer.
///
/// File metadata is captured once when the session is created. Selection and
/// subtitles live behind an async lock held for the whole subtitle rebuild;
/// the access stamp has its own short lock so lookups never queue behind a
/// selection.
pub struct Session {
    info_hash: InfoHash,
    name: String,
    files: Vec<FileEntry>,
    engine_files: Vec<Arc<dyn TransferFile>>,
    handle: Arc<dyn TransferHandle>,
    added_at: DateTime<Utc>,
    state: tokio::sync::Mutex<SelectionState>,
    last_access: parking_lot::Mutex<Instant>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info_hash", &self.info_hash)
            .field("name", &self.name)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a session, without subtitle content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: InfoHash,
    pub name: String,
    pub files: Vec<FileEntry>,
    /// Selected ordinal, -1 when nothing is selected.
    pub selected_file: i64,
    pub subtitles: Vec<SubtitleSummary>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleSummary {
    pub name: String,
    pub index: SubtitleSource,
}

impl Session {
    /// Builds a session from a handle whose metadata has arrived.
    pub(crate) fn from_handle(handle: Arc<dyn TransferHandle>) -> Self {
        let engine_files = handle.files();
        let files = classify_files(&engine_files);

        Self {
            info_hash: handle.info_hash(),
            name: handle.display_name(),
            files,
            engine_files,
            handle,
            added_at: Utc::now(),
            state: tokio::sync::Mutex::new(SelectionState {
                next_external: 1,
                ..SelectionState::default()
            }),
            last_access: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Currently selected file, if any.
    pub async fn selected(&self) -> Option<FileEntry> {
        let selected = self.state.lock().await.selected;
        selected.and_then(|index| self.files.get(index).cloned())
    }

    /// Subtitle tracks for the current selection, content included.
    pub async fn subtitles(&self) -> Vec<Subtitle> {
        self.state.lock().await.subtitles.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            id: self.info_hash,
            name: self.name.clone(),
            files: self.files.clone(),
            selected_file: state.selected.map_or(-1, |index| index as i64),
            subtitles: state
                .subtitles
                .iter()
                .map(|subtitle| SubtitleSummary {
                    name: subtitle.name.clone(),
                    index: subtitle.source,
                })
                .collect(),
            added_at: self.added_at,
        }
    }

    /// Text to hand a subtitle search service: the selected file's stem, or
    /// the session name when nothing is selected.
    pub async fn search_query(&self) -> String {
        self.selected()
            .await
            .and_then(|file| {
                Path::new(&file.path)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.name.clone())
    }

    /// Refreshes the last-access stamp.
    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// True once the session has been idle strictly longer than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.idle_for() > max_age
    }

    pub(crate) fn release(&self) {
        self.handle.release();
    }

    pub(crate) fn engine_file(&self, index: usize) -> Option<&Arc<dyn TransferFile>> {
        self.engine_files.get(index)
    }

    /// Selects `file_index` and rebuilds the subtitle list around it.
    ///
    /// The session lock is held for the whole rebuild, so concurrent
    /// selections on one session are serialized.
    pub(crate) async fn select(&self, file_index: i64) -> Result<FileEntry, SessionError> {
        let index = usize::try_from(file_index)
            .ok()
            .filter(|&index| index < self.files.len())
            .ok_or(SessionError::OutOfRange {
                index: file_index,
                file_count: self.files.len(),
            })?;

        let mut state = self.state.lock().await;
        self.touch();

        for (ordinal, file) in self.engine_files.iter().enumerate() {
            let priority = if ordinal == index {
                FilePriority::Normal
            } else {
                FilePriority::None
            };
            file.set_priority(priority);
        }
        debug!(info_hash = %self.info_hash, index, "Prioritized selected file");

        state.selected = Some(index);
        state.subtitles = self.collect_subtitles(index).await;

        Ok(self.files[index].clone())
    }

    /// Reads every subtitle file of the transfer, ranked against `selected`.
    async fn collect_subtitles(&self, selected: usize) -> Vec<Subtitle> {
        let selected_path = self.files[selected].path.as_str();
        let mut candidates = Vec::new();

        for entry in self.files.iter().filter(|entry| entry.is_subtitle) {
            let Some(file) = self.engine_files.get(entry.index) else {
                continue;
            };
            file.set_priority(FilePriority::Immediate);

            match read_fully(file.as_ref()).await {
                Ok(content) => {
                    let (_, content) = subtitle::normalize(&entry.path, &content, false);
                    candidates.push((
                        entry.path.as_str(),
                        Subtitle {
                            name: entry.file_name().to_string(),
                            source: SubtitleSource::Native {
                                file_index: entry.index,
                            },
                            content,
                        },
                    ));
                }
                Err(e) => {
                    warn!(
                        info_hash = %self.info_hash,
                        path = %entry.path,
                        error = %e,
                        "Skipping unreadable subtitle"
                    );
                }
            }
        }

        let count = candidates.len();
        let ranked = partition(selected_path, candidates, |(path, _)| *path);
        debug!(info_hash = %self.info_hash, count, "Collected subtitles");
        ranked.into_iter().map(|(_, subtitle)| subtitle).collect()
    }

    /// Normalizes and appends an externally supplied subtitle.
    pub(crate) async fn attach(&self, file_name: &str, content: &[u8]) -> Subtitle {
        let (name, content) = subtitle::normalize(file_name, content, true);
        let mut state = self.state.lock().await;
        self.touch();

        let sequence = state.next_external;
        state.next_external += 1;
        let subtitle = Subtitle {
            name,
            source: SubtitleSource::External { sequence },
            content,
        };
        state.subtitles.push(subtitle.clone());
        subtitle
    }

    /// Content of the track identified by its wire index.
    pub async fn subtitle_content(&self, wire_index: i64) -> Option<Bytes> {
        let source = SubtitleSource::from_wire_index(wire_index)?;
        self.state
            .lock()
            .await
            .subtitles
            .iter()
            .find(|subtitle| subtitle.source == source)
            .map(|subtitle| subtitle.content.clone())
    }
}

async fn read_fully(file: &dyn TransferFile) -> std::io::Result<Vec<u8>> {
    let mut reader = file.new_reader();
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await?;
    Ok(content)
}
