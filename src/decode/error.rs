//! Decode error types

use std::fmt;
use std::io;

/// Error raised inside a decode engine
#[derive(Debug)]
pub enum DecodeError {
    /// The pass was aborted
    Aborted,
    /// Reading the stream failed
    Io(io::Error),
    /// The stream is not a valid image of the engine's format
    Format(String),
    /// A broadcast primitive was called out of order
    OutOfOrder(&'static str),
    /// The pixel decoder rejected the data
    Image(image::ImageError),
}

impl DecodeError {
    pub fn format(reason: impl Into<String>) -> Self {
        DecodeError::Format(reason.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, DecodeError::Aborted)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Aborted => write!(f, "Decode aborted"),
            DecodeError::Io(e) => write!(f, "Stream read failed: {}", e),
            DecodeError::Format(reason) => write!(f, "Malformed image: {}", reason),
            DecodeError::OutOfOrder(what) => write!(f, "Broadcast out of order: {}", what),
            DecodeError::Image(e) => write!(f, "Image decode failed: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            DecodeError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        // Aborted streams report ConnectionAborted
        if e.kind() == io::ErrorKind::ConnectionAborted {
            DecodeError::Aborted
        } else {
            DecodeError::Io(e)
        }
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => io.into(),
            other => DecodeError::Image(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_abort_maps_to_aborted() {
        let err: DecodeError = crate::stream::aborted_error().into();
        assert!(err.is_aborted());

        let err: DecodeError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DecodeError::format("bad header").to_string(),
            "Malformed image: bad header"
        );
        assert_eq!(
            DecodeError::OutOfOrder("pixels before dimensions").to_string(),
            "Broadcast out of order: pixels before dimensions"
        );
    }
}
