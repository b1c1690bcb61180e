//! Byte streams feeding decode passes
//!
//! Each pass opens its own reader through a [`StreamProvider`] and wraps it
//! in an [`ImageStream`], which buffers the leading bytes for sniffing and
//! fails every read once the pass's [`AbortSignal`] fires.

pub mod buffer;
pub mod provider;

use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;

pub use buffer::StreamBuffer;
pub use provider::{BytesProvider, FileProvider, StreamProvider};

/// Default read size when pulling from the underlying reader
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    hooks: Mutex<Vec<AbortHook>>,
}

/// One-shot cancellation flag shared by a pass, its stream and its engine
///
/// Hooks registered with [`AbortSignal::on_abort`] run exactly once, on the
/// thread that triggers the abort (or immediately if it already fired).
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Fire the signal; returns false if it had already fired
    pub fn trigger(&self) -> bool {
        if self.inner.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        for hook in hooks {
            hook();
        }
        true
    }

    /// Run `hook` when the signal fires
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.inner.hooks.lock();
        if self.is_aborted() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Error reported by reads after an abort
///
/// Deliberately not `ErrorKind::Interrupted`, which `Read` helpers retry.
pub(crate) fn aborted_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "decode aborted")
}

/// Stream handed to a decode engine
pub struct ImageStream {
    reader: Box<dyn Read + Send>,
    abort: AbortSignal,
    /// Bytes pulled from the reader but not yet consumed
    pending: BytesMut,
    scratch: Vec<u8>,
    bytes_read: u64,
    eof: bool,
}

impl ImageStream {
    pub fn new(reader: Box<dyn Read + Send>, abort: AbortSignal) -> Self {
        Self::with_chunk_size(reader, abort, DEFAULT_READ_CHUNK)
    }

    pub fn with_chunk_size(reader: Box<dyn Read + Send>, abort: AbortSignal, chunk: usize) -> Self {
        Self {
            reader,
            abort,
            pending: BytesMut::new(),
            scratch: vec![0; chunk.max(1)],
            bytes_read: 0,
            eof: false,
        }
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Total bytes pulled from the underlying reader
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Look at up to `len` leading bytes without consuming them
    ///
    /// Returns fewer bytes only at end of stream.
    pub fn peek(&mut self, len: usize) -> io::Result<&[u8]> {
        while self.pending.len() < len && !self.eof {
            self.fill()?;
        }
        let n = len.min(self.pending.len());
        Ok(&self.pending[..n])
    }

    /// Consume the rest of the stream
    pub fn read_remaining(&mut self) -> io::Result<Bytes> {
        while !self.eof {
            self.fill()?;
        }
        Ok(self.pending.split().freeze())
    }

    fn check_abort(&self) -> io::Result<()> {
        if self.abort.is_aborted() {
            Err(aborted_error())
        } else {
            Ok(())
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        loop {
            self.check_abort()?;
            match self.reader.read(&mut self.scratch) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&self.scratch[..n]);
                    self.bytes_read += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) if self.abort.is_aborted() => return Err(aborted_error()),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Read for ImageStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_abort()?;
        if self.pending.is_empty() && !self.eof {
            self.fill()?;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}
