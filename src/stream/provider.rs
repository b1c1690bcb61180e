//! Stream providers

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};

use super::AbortSignal;

/// Opens a fresh byte stream for each decode pass
///
/// `abort` fires when the pass is abandoned; blocking providers should use
/// [`AbortSignal::on_abort`] to unblock pending reads.
pub trait StreamProvider: Send + Sync {
    fn open(&self, abort: &AbortSignal) -> io::Result<Box<dyn Read + Send>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String {
        "stream".to_string()
    }
}

/// In-memory image data
#[derive(Debug, Clone)]
pub struct BytesProvider {
    data: Bytes,
}

impl BytesProvider {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StreamProvider for BytesProvider {
    fn open(&self, _abort: &AbortSignal) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.data.clone().reader()))
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }
}

/// Image file on disk, reopened for each pass
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StreamProvider for FileProvider {
    fn open(&self, _abort: &AbortSignal) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
