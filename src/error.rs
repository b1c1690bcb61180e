//! Crate error types
//!
//! Decode failures are not errors at this level: they reach consumers as
//! completion events. The only synchronous failure of registration is an
//! identity conflict.

use std::fmt;

use crate::source::SourceKey;

/// Error type for image source operations
#[derive(Debug)]
pub enum Error {
    /// A consumer was registered under a different captured identity than
    /// the one it is already tracked with
    IdentityConflict(SourceKey),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IdentityConflict(key) => write!(
                f,
                "Consumer registered on {} under a conflicting security context",
                key
            ),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether this error is a security fault rather than an operational one
    pub fn is_security_fault(&self) -> bool {
        matches!(self, Error::IdentityConflict(_))
    }
}

/// Result alias for image source operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_conflict_display() {
        let err = Error::IdentityConflict(SourceKey::new("logo.gif"));

        assert!(err.is_security_fault());
        assert_eq!(
            err.to_string(),
            "Consumer registered on logo.gif under a conflicting security context"
        );
        assert!(std::error::Error::source(&err).is_none());
    }
}
