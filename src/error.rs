//! Error types for the stashkit library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: The single error enum for every fallible surface in the
//!   crate. Lookup absence and TTL expiry are deliberately *not* errors; they
//!   produce `None` results. `KeyNotFound` and `Expired` exist for callers
//!   that want to convert an absent result into an error at their own
//!   boundary.
//! - [`CacheResult`]: Alias used by the async surfaces ([`Store`],
//!   [`LoadingCache`], [`TieredCache`]).
//!
//! All variants are `Clone` so a single load failure can be fanned out to
//! every caller waiting on the same in-flight slot.
//!
//! [`Store`]: crate::store::Store
//! [`LoadingCache`]: crate::loading::LoadingCache
//! [`TieredCache`]: crate::tiered::TieredCache

use thiserror::Error;

/// Result alias for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by cache, loader, and store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The requested key has no mapping.
    #[error("key not found: `{0}`")]
    KeyNotFound(String),

    /// The mapping for the key exists but its TTL has elapsed.
    #[error("entry for `{0}` has expired")]
    Expired(String),

    /// Capacity enforcement could not make room. Internal; resolved by
    /// eviction before any public operation returns.
    #[error("cache capacity exceeded")]
    CapacityExceeded,

    /// An asynchronous loader failed. The failure propagates to every caller
    /// awaiting the same in-flight load and nothing is cached.
    #[error("loader failed for `{key}`: {detail}")]
    LoaderFailed {
        /// Key the loader was invoked for.
        key: String,
        /// Human-readable failure description.
        detail: String,
    },

    /// A persistent store operation failed at the I/O layer.
    #[error("store i/o failed: {detail}")]
    StoreIo {
        /// Human-readable failure description.
        detail: String,
    },

    /// A persisted entry could not be decoded. The file store self-heals by
    /// deleting the offending file and reporting the key as absent.
    #[error("corrupt cache entry: {detail}")]
    Corrupt {
        /// Human-readable failure description.
        detail: String,
    },
}

impl CacheError {
    /// Creates a [`CacheError::LoaderFailed`] for the given key.
    pub fn loader_failed(key: impl Into<String>, detail: impl ToString) -> Self {
        CacheError::LoaderFailed {
            key: key.into(),
            detail: detail.to_string(),
        }
    }

    /// Creates a [`CacheError::Corrupt`] with the given description.
    pub fn corrupt(detail: impl ToString) -> Self {
        CacheError::Corrupt {
            detail: detail.to_string(),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StoreIo {
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_key() {
        let err = CacheError::KeyNotFound("users::42".to_string());
        assert_eq!(err.to_string(), "key not found: `users::42`");
    }

    #[test]
    fn loader_failed_carries_detail() {
        let err = CacheError::loader_failed("x", "backend unreachable");
        assert_eq!(
            err.to_string(),
            "loader failed for `x`: backend unreachable"
        );
    }

    #[test]
    fn io_errors_convert_to_store_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CacheError::from(io);
        assert!(matches!(err, CacheError::StoreIo { .. }));
    }

    #[test]
    fn errors_are_cloneable() {
        let err = CacheError::loader_failed("k", "boom");
        assert_eq!(err.clone(), err);
    }
}
