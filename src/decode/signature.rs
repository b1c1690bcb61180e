//! Format signature table
//!
//! Engines are picked by sniffing the leading bytes of the stream; any
//! declared content type is ignored.

use std::fmt;
use std::sync::Arc;

use super::gif::GifEngine;
use super::jpeg::JpegEngine;
use super::png::PngEngine;
use super::xbm::XbmEngine;
use super::DecodeEngine;

/// Constructor for a fresh engine
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn DecodeEngine> + Send + Sync>;

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone)]
struct Signature {
    name: &'static str,
    matches: fn(&[u8]) -> bool,
    factory: EngineFactory,
}

/// Ordered `(predicate, constructor)` pairs; the first match wins
#[derive(Clone, Default)]
pub struct SignatureTable {
    entries: Vec<Signature>,
}

impl SignatureTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// GIF, JPEG, XBM and PNG
    pub fn standard() -> Self {
        Self::new()
            .with_signature("gif", is_gif, || Box::new(GifEngine::new()))
            .with_signature("jpeg", is_jpeg, || Box::new(JpegEngine::new()))
            .with_signature("xbm", is_xbm, || Box::new(XbmEngine::new()))
            .with_signature("png", is_png, || Box::new(PngEngine::new()))
    }

    /// Append a signature after the existing ones
    pub fn with_signature(
        mut self,
        name: &'static str,
        matches: fn(&[u8]) -> bool,
        factory: impl Fn() -> Box<dyn DecodeEngine> + Send + Sync + 'static,
    ) -> Self {
        self.entries.push(Signature {
            name,
            matches,
            factory: Arc::new(factory),
        });
        self
    }

    /// Build the engine for the first signature matching `prefix`
    pub fn select(&self, prefix: &[u8]) -> Option<Box<dyn DecodeEngine>> {
        self.entries
            .iter()
            .find(|sig| (sig.matches)(prefix))
            .map(|sig| (sig.factory)())
    }

    /// Name of the first signature matching `prefix`
    pub fn identify(&self, prefix: &[u8]) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|sig| (sig.matches)(prefix))
            .map(|sig| sig.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SignatureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|sig| sig.name))
            .finish()
    }
}

pub fn is_gif(prefix: &[u8]) -> bool {
    prefix.starts_with(b"GIF8")
}

pub fn is_jpeg(prefix: &[u8]) -> bool {
    prefix.starts_with(&[0xFF, 0xD8, 0xFF])
}

pub fn is_xbm(prefix: &[u8]) -> bool {
    prefix.starts_with(b"#def")
}

pub fn is_png(prefix: &[u8]) -> bool {
    prefix.starts_with(&PNG_SIGNATURE)
}
