//! Files and readers handed out by the memory engine.
//!
//! Each reader shares a record with the engine so readahead and responsive
//! mode requests stay observable after the reader has been boxed.

use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use super::{EngineInner, FileSource, MemoryFileSpec, ReaderRecord};
use crate::engine::{FilePriority, InfoHash, TransferFile, TransferReader};

/// Walks `path` depth-first in name order, collecting
/// `(relative path, disk path, length)` for every regular file.
pub(super) fn collect_files(
    path: &Path,
    relative: &str,
    out: &mut Vec<(String, PathBuf, u64)>,
) -> io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() {
        out.push((relative.to_string(), path.to_path_buf(), metadata.len()));
        return Ok(());
    }

    let mut children: Vec<_> = std::fs::read_dir(path)?.collect::<Result<_, _>>()?;
    children.sort_by_key(|entry| entry.file_name());
    for child in children {
        let child_name = child.file_name().to_string_lossy().into_owned();
        collect_files(&child.path(), &format!("{relative}/{child_name}"), out)?;
    }
    Ok(())
}

pub(super) struct MemoryFile {
    pub(super) info_hash: InfoHash,
    pub(super) index: usize,
    pub(super) spec: MemoryFileSpec,
    pub(super) fail_reads: bool,
    pub(super) engine: Arc<EngineInner>,
}

impl TransferFile for MemoryFile {
    fn path(&self) -> String {
        self.spec.path.clone()
    }

    fn length(&self) -> u64 {
        self.spec.length
    }

    fn set_priority(&self, priority: FilePriority) {
        self.engine
            .state
            .lock()
            .priorities
            .insert((self.info_hash, self.index), priority);
    }

    fn new_reader(&self) -> Box<dyn TransferReader> {
        let record = Arc::new(Mutex::new(ReaderRecord {
            info_hash: self.info_hash,
            path: self.spec.path.clone(),
            readahead: None,
            responsive: false,
        }));
        self.engine.state.lock().readers.push(Arc::clone(&record));

        let source = if self.fail_reads {
            ReaderSource::Failing(self.spec.path.clone())
        } else {
            match &self.spec.source {
                FileSource::Zeroes => ReaderSource::Zeroes {
                    length: self.spec.length,
                    position: 0,
                },
                FileSource::Memory(content) => ReaderSource::Memory(Cursor::new(content.clone())),
                FileSource::Disk(path) => match std::fs::File::open(path) {
                    Ok(file) => ReaderSource::Disk(tokio::fs::File::from_std(file)),
                    Err(_) => ReaderSource::Failing(self.spec.path.clone()),
                },
            }
        };

        Box::new(MemoryReader::new(source, record))
    }
}

enum ReaderSource {
    Memory(Cursor<Bytes>),
    Disk(tokio::fs::File),
    Zeroes { length: u64, position: u64 },
    Failing(String),
}

struct MemoryReader {
    source: ReaderSource,
    record: Arc<Mutex<ReaderRecord>>,
}

impl MemoryReader {
    fn new(source: ReaderSource, record: Arc<Mutex<ReaderRecord>>) -> Self {
        Self { source, record }
    }
}

fn read_failure(path: &str) -> io::Error {
    io::Error::other(format!("simulated read failure for {path}"))
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().source {
            ReaderSource::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            ReaderSource::Disk(file) => Pin::new(file).poll_read(cx, buf),
            ReaderSource::Zeroes { length, position } => {
                let available = length.saturating_sub(*position);
                let n = available.min(buf.remaining() as u64) as usize;
                buf.put_slice(&vec![0u8; n]);
                *position += n as u64;
                Poll::Ready(Ok(()))
            }
            ReaderSource::Failing(path) => Poll::Ready(Err(read_failure(path))),
        }
    }
}

impl AsyncSeek for MemoryReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match &mut self.get_mut().source {
            ReaderSource::Memory(cursor) => Pin::new(cursor).start_seek(position),
            ReaderSource::Disk(file) => Pin::new(file).start_seek(position),
            ReaderSource::Zeroes {
                length,
                position: current,
            } => {
                let target = match position {
                    SeekFrom::Start(offset) => Some(offset),
                    SeekFrom::End(delta) => length.checked_add_signed(delta),
                    SeekFrom::Current(delta) => current.checked_add_signed(delta),
                };
                *current = target.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
                })?;
                Ok(())
            }
            ReaderSource::Failing(path) => Err(read_failure(path)),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match &mut self.get_mut().source {
            ReaderSource::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            ReaderSource::Disk(file) => Pin::new(file).poll_complete(cx),
            ReaderSource::Zeroes { position, .. } => Poll::Ready(Ok(*position)),
            ReaderSource::Failing(path) => Poll::Ready(Err(read_failure(path))),
        }
    }
}

impl TransferReader for MemoryReader {
    fn set_readahead(&mut self, bytes: u64) {
        self.record.lock().readahead = Some(bytes);
    }

    fn set_responsive(&mut self) {
        self.record.lock().responsive = true;
    }
}
