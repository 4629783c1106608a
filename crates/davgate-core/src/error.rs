//! Error taxonomy for storage providers.
//!
//! Providers report outcomes through [`StorageError`]; the protocol engine
//! translates these into HTTP status codes at its own boundary. Providers
//! never map to status codes themselves.

use std::io;
use thiserror::Error;

/// Errors a storage provider can report.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// The resource already exists where exclusivity is required.
    #[error("resource already exists")]
    AlreadyExists,

    /// The parent collection of the target does not exist.
    #[error("parent collection missing")]
    ParentMissing,

    /// The operation requires a collection but the resource is a leaf.
    #[error("not a collection")]
    NotACollection,

    /// The operation requires a leaf but the resource is a collection.
    #[error("is a collection")]
    IsACollection,

    /// The provider refused the operation (read-only mount, permissions).
    #[error("permission denied")]
    Forbidden,

    /// The backend is out of capacity or quota.
    #[error("insufficient storage")]
    InsufficientStorage,

    /// The provider does not implement this operation.
    #[error("operation not supported")]
    NotSupported,

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Collapse an I/O error into the taxonomy where the kind is meaningful.
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound,
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists,
            io::ErrorKind::PermissionDenied => StorageError::Forbidden,
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                StorageError::InsufficientStorage
            }
            io::ErrorKind::NotADirectory => StorageError::NotACollection,
            io::ErrorKind::IsADirectory => StorageError::IsACollection,
            io::ErrorKind::DirectoryNotEmpty => StorageError::Forbidden,
            _ => StorageError::Io(e),
        }
    }
}

/// Result type for provider operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let e = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert!(matches!(StorageError::from_io(e), StorageError::NotFound));

        let e = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(StorageError::from_io(e), StorageError::Forbidden));

        let e = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        assert!(matches!(StorageError::from_io(e), StorageError::AlreadyExists));
    }
}
