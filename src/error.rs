use std::sync::Arc;

use crate::store::StoreError;

/// Maximum raw avatar size accepted by `upload_avatar` (2 MiB).
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Error taxonomy surfaced by the data layer to the UI.
///
/// Variants are `Clone` (message payloads only) so a failed load shared
/// between coalesced cache waiters can be handed to every caller.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    /// The store rejected a write's shape or constraints.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The targeted row does not exist (or is no longer in a state the
    /// operation applies to).
    #[error("not found: {0}")]
    NotFound(String),

    /// Role-gated operation attempted without permission, either caught
    /// client-side or rejected by the store's row-level security.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Avatar upload with a non-image MIME type.
    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    /// Avatar upload exceeding the size limit.
    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    /// Transport-level failure, store unreachable.
    #[error("network error: {0}")]
    Network(String),

    /// Invariant breakage inside the data layer itself, e.g. a malformed
    /// row that failed to coerce into its record schema.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DataError {
    /// Recovers an owned error from the `Arc` that moka hands to waiters
    /// sharing a failed load.
    pub fn from_shared(err: Arc<DataError>) -> DataError {
        Arc::try_unwrap(err).unwrap_or_else(|arc| (*arc).clone())
    }
}

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Authorization(msg) => DataError::Authorization(msg),
            StoreError::Constraint(msg) => DataError::Validation(msg),
            StoreError::Unavailable(msg) => DataError::Network(msg),
            StoreError::Other(msg) => DataError::Network(msg),
        }
    }
}

pub type DataResult<T> = Result<T, DataError>;
