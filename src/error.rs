//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// Only the `set` family of operations can fail; `get` and `delete`
/// report absence through their return values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The value alone exceeds the total cache capacity.
    ///
    /// This is permanent for the given size and is never retried.
    #[error("size limit exceeded: value of {size} bytes exceeds capacity of {max_size} bytes")]
    SizeLimit { size: usize, max_size: usize },

    /// Capacity is currently insufficient for the value.
    ///
    /// Retried internally after eviction; it only escapes a top-level
    /// `set` when eviction cannot free enough space.
    #[error("low space: {size} bytes requested but only {available} bytes free")]
    LowSpace { size: usize, available: usize },

    /// The eviction loop found nothing left to remove.
    #[error("eviction exhausted: cache is empty and space is still insufficient")]
    EvictionExhausted,
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_compare_structurally() {
        assert_eq!(
            CacheError::SizeLimit { size: 10, max_size: 5 },
            CacheError::SizeLimit { size: 10, max_size: 5 }
        );
        assert_ne!(
            CacheError::SizeLimit { size: 10, max_size: 5 },
            CacheError::LowSpace { size: 10, available: 5 }
        );
        assert_eq!(CacheError::EvictionExhausted, CacheError::EvictionExhausted);
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::SizeLimit { size: 20, max_size: 15 };
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("15"));

        let err = CacheError::LowSpace { size: 7, available: 3 };
        assert!(err.to_string().contains("7"));
        assert!(err.to_string().contains("3"));
    }
}
