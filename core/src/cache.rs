//! Key-value cache abstraction.
//!
//! The cache holds derived, eventually-consistent values (such as the
//! announcement text). It is never consulted for capacity decisions.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by cache operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Errors that can occur during cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Simple string cache with get/put semantics.
///
/// `put` overwrites unconditionally; last writer wins.
pub trait Cache: Send + Sync {
    /// Read a cached value.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    fn get(&self, key: &str) -> CacheFuture<'_, Option<String>>;

    /// Overwrite a cached value.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    fn put(&self, key: &str, value: String) -> CacheFuture<'_, ()>;
}
