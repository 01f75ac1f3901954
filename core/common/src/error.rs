//! Common error types for Cipherbox.

use thiserror::Error;

/// Top-level error type for Cipherbox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Tag verification failed: wrong key, or corrupted/tampered data.
    ///
    /// The codec cannot distinguish the two causes; the caller decides what
    /// an authentication failure means at its level (e.g. "invalid
    /// credentials" at login, "log the user out" while serving).
    #[error("authentication failed")]
    Authentication,

    /// Referenced path or entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying storage read/write failure, propagated unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key rotation failed. Raised only after the store was rolled back to a
    /// consistent state.
    #[error("key rotation failed: {0}")]
    Rotation(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic primitive failure other than tag verification.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl Error {
    /// Whether this error is a tag-verification failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_predicate() {
        assert!(Error::Authentication.is_authentication());
        assert!(!Error::NotFound("x".to_string()).is_authentication());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
