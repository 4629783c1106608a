//! Error taxonomy for the protocol engine.
//!
//! Every per-request failure is one of these kinds; the dispatcher maps a
//! kind to its HTTP status at a single boundary. Subsystems (auth, locks,
//! properties) return outcome values rather than throwing errors past the
//! dispatcher, so this enum stays small.

use davgate_core::StorageError;
use http::StatusCode;
use thiserror::Error;

/// A per-request protocol failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DavError {
    /// The request is malformed (bad header value, unparsable body).
    #[error("malformed request")]
    BadRequest,

    /// The authenticated account may not perform this operation.
    #[error("access denied")]
    Forbidden,

    /// Unmapped path or missing resource.
    #[error("resource not found")]
    NotFound,

    /// The method is not supported for this resource.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Missing parent, existing target, or an otherwise colliding state.
    #[error("conflict")]
    Conflict,

    /// An `If` or `Overwrite` condition did not hold.
    #[error("precondition failed")]
    PreconditionFailed,

    /// The method does not accept the supplied body.
    #[error("unsupported media type")]
    UnsupportedMediaType,

    /// An incompatible lock is held and no valid token was presented.
    #[error("resource is locked")]
    Locked,

    /// The operation was vetoed because a sibling operation failed.
    #[error("failed dependency")]
    FailedDependency,

    /// The storage backend is out of capacity.
    #[error("insufficient storage")]
    InsufficientStorage,

    /// Unexpected engine-side failure.
    #[error("internal error")]
    Internal,
}

impl DavError {
    /// The HTTP status this kind maps to.
    pub fn status(self) -> StatusCode {
        match self {
            DavError::BadRequest => StatusCode::BAD_REQUEST,
            DavError::Forbidden => StatusCode::FORBIDDEN,
            DavError::NotFound => StatusCode::NOT_FOUND,
            DavError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Conflict => StatusCode::CONFLICT,
            DavError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            DavError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DavError::Locked => StatusCode::LOCKED,
            DavError::FailedDependency => StatusCode::FAILED_DEPENDENCY,
            DavError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            DavError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for DavError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => DavError::NotFound,
            StorageError::AlreadyExists
            | StorageError::ParentMissing
            | StorageError::NotACollection
            | StorageError::IsACollection => DavError::Conflict,
            StorageError::Forbidden | StorageError::NotSupported => DavError::Forbidden,
            StorageError::InsufficientStorage => DavError::InsufficientStorage,
            StorageError::Io(_) => DavError::Internal,
        }
    }
}

/// Result type for engine operations.
pub type DavResult<T> = Result<T, DavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DavError::Locked.status(), StatusCode::LOCKED);
        assert_eq!(DavError::FailedDependency.status().as_u16(), 424);
        assert_eq!(DavError::InsufficientStorage.status().as_u16(), 507);
    }

    #[test]
    fn test_storage_error_translation() {
        assert_eq!(DavError::from(StorageError::ParentMissing), DavError::Conflict);
        assert_eq!(DavError::from(StorageError::NotFound), DavError::NotFound);
        assert_eq!(
            DavError::from(StorageError::InsufficientStorage),
            DavError::InsufficientStorage
        );
    }
}
