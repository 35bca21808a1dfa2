//! Files and readers handed out by the librqbit engine.
//!
//! librqbit keeps the pieces right after every open stream's position at the
//! front of its queue, which is what responsive mode asks for. Read-ahead and
//! responsive requests are therefore only logged.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use librqbit::ManagedTorrent;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tracing::{debug, warn};

use super::{RqbitInner, SharedTorrent};
use crate::engine::{FilePriority, TransferFile, TransferReader};

pub(super) struct RqbitFile {
    pub(super) index: usize,
    pub(super) path: String,
    pub(super) length: u64,
    pub(super) torrent: Arc<ManagedTorrent>,
    pub(super) shared: Arc<SharedTorrent>,
    pub(super) engine: Arc<RqbitInner>,
}

impl TransferFile for RqbitFile {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn length(&self) -> u64 {
        self.length
    }

    /// `None` drops the file from the download set, anything else adds it.
    fn set_priority(&self, priority: FilePriority) {
        let changed = {
            let mut wanted = self.shared.wanted.lock();
            match priority {
                FilePriority::None => wanted.remove(&self.index),
                FilePriority::Normal | FilePriority::Immediate => wanted.insert(self.index),
            }
        };
        if !changed {
            return;
        }

        let torrent = Arc::clone(&self.torrent);
        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        let index = self.index;
        self.engine.runtime.spawn(async move {
            let _serial = shared.wanted_sync.lock().await;
            let wanted = shared.wanted.lock().clone();
            match engine.session.update_only_files(&torrent, &wanted).await {
                Ok(()) => debug!(
                    info_hash = %shared.info_hash,
                    index,
                    ?priority,
                    files = wanted.len(),
                    "Updated download set"
                ),
                Err(e) => warn!(
                    info_hash = %shared.info_hash,
                    index,
                    error = %format!("{e:#}"),
                    "Failed to update download set"
                ),
            }
        });
    }

    fn new_reader(&self) -> Box<dyn TransferReader> {
        let source = match Arc::clone(&self.torrent).stream(self.index) {
            Ok(stream) => ReaderSource::Stream(Box::pin(stream)),
            Err(e) => {
                warn!(path = %self.path, error = %format!("{e:#}"), "Failed to open stream");
                ReaderSource::Failed(format!("{e:#}"))
            }
        };

        Box::new(RqbitReader {
            source,
            path: self.path.clone(),
        })
    }
}

trait PieceStream: AsyncRead + AsyncSeek + Send {}

impl<T: AsyncRead + AsyncSeek + Send> PieceStream for T {}

enum ReaderSource {
    Stream(Pin<Box<dyn PieceStream>>),
    Failed(String),
}

struct RqbitReader {
    source: ReaderSource,
    path: String,
}

fn open_failure(path: &str, reason: &str) -> io::Error {
    io::Error::other(format!("cannot stream {path}: {reason}"))
}

impl AsyncRead for RqbitReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.source {
            ReaderSource::Stream(stream) => stream.as_mut().poll_read(cx, buf),
            ReaderSource::Failed(reason) => Poll::Ready(Err(open_failure(&this.path, reason))),
        }
    }
}

impl AsyncSeek for RqbitReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        match &mut this.source {
            ReaderSource::Stream(stream) => stream.as_mut().start_seek(position),
            ReaderSource::Failed(reason) => Err(open_failure(&this.path, reason)),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        match &mut this.source {
            ReaderSource::Stream(stream) => stream.as_mut().poll_complete(cx),
            ReaderSource::Failed(reason) => Poll::Ready(Err(open_failure(&this.path, reason))),
        }
    }
}

impl TransferReader for RqbitReader {
    fn set_readahead(&mut self, bytes: u64) {
        debug!(path = %self.path, bytes, "Read-ahead requested");
    }

    fn set_responsive(&mut self) {
        debug!(path = %self.path, "Responsive reads requested");
    }
}
