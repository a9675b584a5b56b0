//! Cache error type.

use fncmp_core::errors::{self as codes, DispatchError};
use thiserror::Error;

/// Errors returned by cache reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No entry exists under the key (never created, deleted, or expired).
    #[error("cache entry not found: {store}/{key}")]
    NotFound {
        /// Store namespace.
        store: String,
        /// Entry key.
        key: String,
    },

    /// The entry holds a value of another type.
    #[error("cache entry has wrong type: expected {expected}, found {found}")]
    WrongType {
        /// Type requested by the caller.
        expected: &'static str,
        /// Type fixed by the first write.
        found: &'static str,
    },

    /// A session-scoped lookup was attempted without a store key.
    #[error("missing session context for cache lookup")]
    MissingSessionContext,
}

impl CacheError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::WrongType { .. } => codes::WRONG_TYPE,
            Self::MissingSessionContext => codes::MISSING_SESSION_CONTEXT,
        }
    }

    pub(crate) fn not_found(store: &str, key: &str) -> Self {
        Self::NotFound {
            store: store.to_owned(),
            key: key.to_owned(),
        }
    }
}

impl From<CacheError> for DispatchError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { store, key } => DispatchError::NotFound {
                what: "cache entry",
                id: format!("{store}/{key}"),
            },
            CacheError::WrongType { expected, found } => DispatchError::WrongType { expected, found },
            CacheError::MissingSessionContext => DispatchError::MissingSessionContext,
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
