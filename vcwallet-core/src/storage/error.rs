//! Error types for the secure store.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StoreError>;

/// Errors raised by the secure store and the identity minter.
///
/// Lifecycle failures are kept distinct (`InvalidPassphrase` vs.
/// `StoreCorrupt` vs. `NotInitialized`) so callers can message them
/// differently.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs the store to be unlocked.
    #[error("store is locked")]
    StoreLocked,

    /// No store exists on disk yet.
    #[error("store not initialized")]
    NotInitialized,

    /// `initialize` was called while a store already exists.
    #[error("store already initialized")]
    AlreadyInitialized,

    /// The passphrase did not open the canary record.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// On-disk state is inconsistent or unreadable under the correct key.
    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    /// Filesystem failure.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Operation being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Record lookup failed where a missing record is not a no-op.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// AEAD or key-derivation failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Identity minting failed.
    #[error("identity error: {0}")]
    Identity(String),

    /// Errors coming from the storage lock.
    #[error("storage lock error: {0}")]
    Lock(String),
}

impl StoreError {
    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a corruption error.
    pub fn corrupt<S: Into<String>>(context: S) -> Self {
        Self::StoreCorrupt(context.into())
    }

    /// Creates a serialization error.
    pub fn serialization<S: ToString>(err: S) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::io(
            "write credential",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("write credential"));
        assert!(StoreError::corrupt("missing metadata")
            .to_string()
            .contains("missing metadata"));
        assert_eq!(StoreError::InvalidPassphrase.to_string(), "invalid passphrase");
    }
}
