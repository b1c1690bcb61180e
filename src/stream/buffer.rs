//! Progressively fed, replayable byte buffer
//!
//! A [`StreamBuffer`] collects bytes as they arrive (typically pumped from an
//! async network reader) and hands every pass its own blocking reader over
//! the same data. Readers that catch up with the feed park until more bytes
//! arrive, the feed finishes, or their pass is aborted.

use std::io::{self, Read};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use super::{aborted_error, AbortSignal, StreamProvider, DEFAULT_READ_CHUNK};

#[derive(Default)]
struct FeedState {
    chunks: Vec<Bytes>,
    len: u64,
    finished: bool,
    error: Option<(io::ErrorKind, String)>,
}

#[derive(Default)]
struct FeedShared {
    state: Mutex<FeedState>,
    more: Condvar,
}

/// Shared, append-only byte feed
#[derive(Clone, Default)]
pub struct StreamBuffer {
    shared: Arc<FeedShared>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; ignored once the feed is finished
    pub fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        if state.finished {
            warn!(len = chunk.len(), "Chunk pushed after feed finished, dropping");
            return;
        }
        state.len += chunk.len() as u64;
        state.chunks.push(chunk);
        self.shared.more.notify_all();
    }

    /// Mark end of data
    pub fn finish(&self) {
        let mut state = self.shared.state.lock();
        state.finished = true;
        self.shared.more.notify_all();
    }

    /// End the feed with an error; readers see it after the buffered bytes
    pub fn fail(&self, error: &io::Error) {
        let mut state = self.shared.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.error = Some((error.kind(), error.to_string()));
        self.shared.more.notify_all();
    }

    /// Bytes received so far
    pub fn len(&self) -> u64 {
        self.shared.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().finished
    }

    /// Copy everything from `reader` into the feed, then finish it
    ///
    /// A read error fails the feed and is returned.
    pub async fn pump<R: AsyncRead + Unpin>(&self, mut reader: R) -> io::Result<u64> {
        let mut buf = BytesMut::with_capacity(DEFAULT_READ_CHUNK);
        let mut total = 0u64;

        loop {
            buf.reserve(DEFAULT_READ_CHUNK);
            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    self.finish();
                    debug!(bytes = total, "Feed complete");
                    return Ok(total);
                }
                Ok(n) => {
                    total += n as u64;
                    self.push(buf.split().freeze());
                }
                Err(e) => {
                    warn!(error = %e, bytes = total, "Feed failed");
                    self.fail(&e);
                    return Err(e);
                }
            }
        }
    }
}

impl StreamProvider for StreamBuffer {
    fn open(&self, abort: &AbortSignal) -> io::Result<Box<dyn Read + Send>> {
        let shared = Arc::clone(&self.shared);
        abort.on_abort(move || {
            // Taking the lock orders the wakeup after any reader's abort check
            let _state = shared.state.lock();
            shared.more.notify_all();
        });

        Ok(Box::new(FeedReader {
            shared: Arc::clone(&self.shared),
            abort: abort.clone(),
            chunk: 0,
            offset: 0,
        }))
    }

    fn describe(&self) -> String {
        "stream buffer".to_string()
    }
}

struct FeedReader {
    shared: Arc<FeedShared>,
    abort: AbortSignal,
    chunk: usize,
    offset: usize,
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();

        loop {
            if self.abort.is_aborted() {
                return Err(aborted_error());
            }
            if let Some(chunk) = state.chunks.get(self.chunk) {
                let available = &chunk[self.offset..];
                let n = buf.len().min(available.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.offset += n;
                if self.offset == chunk.len() {
                    self.chunk += 1;
                    self.offset = 0;
                }
                return Ok(n);
            }
            if let Some((kind, message)) = &state.error {
                return Err(io::Error::new(*kind, message.clone()));
            }
            if state.finished {
                return Ok(0);
            }
            self.shared.more.wait(&mut state);
        }
    }
}
