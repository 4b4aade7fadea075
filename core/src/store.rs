//! Entity store trait and related types.
//!
//! This module defines the core abstraction for a transactional key-value store:
//! entities are addressed by [`EntityKey`], versioned per key, and written through
//! optimistic, all-or-nothing commits.
//!
//! # Design
//!
//! The `EntityStore` trait is deliberately minimal. It provides exactly what the
//! transaction layer needs:
//!
//! - Load one entity by key, the children of a parent key, or every entity of a kind
//! - Allocate collision-free numeric ids
//! - Commit a write set atomically, guarded by the versions observed while reading
//!
//! Retrying on conflict is NOT the store's job; see `conference-central-runtime`.
//!
//! # Implementations
//!
//! - `InMemoryEntityStore` (in `conference-central-testing` crate): fast, deterministic testing

use crate::key::{EntityKey, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: a key read by the transaction changed before commit.
    ///
    /// This is the only transient error: the whole transaction should be retried
    /// from scratch against freshly loaded state.
    #[error("Concurrency conflict on {key}: expected version {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        /// The key whose version moved.
        key: EntityKey,
        /// The version observed when the key was read (`None` = absent).
        expected: Option<Version>,
        /// The version found at commit time (`None` = absent).
        actual: Option<Version>,
    },

    /// Database connection error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// Whether this error is a write race that a fresh transaction attempt may resolve.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// A stored entity as the store sees it: key, version and encoded body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Key of the entity.
    pub key: EntityKey,
    /// Current version of the key.
    pub version: Version,
    /// `serde_json` encoded entity body.
    pub data: Vec<u8>,
}

impl Record {
    /// Decode the entity body.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the body does not decode as `E`.
    pub fn decode<E: Entity>(&self) -> Result<E, StoreError> {
        decode(&self.data)
    }
}

/// A buffered write: the key and the encoded body to store under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    /// Key to write.
    pub key: EntityKey,
    /// `serde_json` encoded entity body.
    pub data: Vec<u8>,
}

impl Write {
    /// Encode an entity into a write for its own key.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be encoded.
    pub fn of<E: Entity>(entity: &E) -> Result<Self, StoreError> {
        let data = serde_json::to_vec(entity)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(Self {
            key: entity.key(),
            data,
        })
    }
}

/// Decode an entity body produced by [`Write::of`].
///
/// # Errors
///
/// Returns `SerializationError` if the bytes do not decode as `E`.
pub fn decode<E: Entity>(data: &[u8]) -> Result<E, StoreError> {
    serde_json::from_slice(data).map_err(|e| StoreError::SerializationError(e.to_string()))
}

/// A value that can be persisted in an [`EntityStore`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Kind name used as the key kind for this entity type.
    const KIND: &'static str;

    /// Key under which this entity is stored.
    fn key(&self) -> EntityKey;
}

/// Transactional entity store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely used in async contexts
/// and shared across threads.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EntityStore>`).
pub trait EntityStore: Send + Sync {
    /// Load one entity by key. Absent keys are `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn load(&self, key: &EntityKey) -> StoreFuture<'_, Option<Record>>;

    /// Load every direct child of `parent` with the given kind.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn load_by_parent(&self, parent: &EntityKey, kind: &str) -> StoreFuture<'_, Vec<Record>>;

    /// Load every entity of the given kind, in key order.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn load_kind(&self, kind: &str) -> StoreFuture<'_, Vec<Record>>;

    /// Allocate a fresh numeric key of `kind`, optionally under `parent`.
    ///
    /// Allocation happens outside any transaction; allocated ids are never reused.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn allocate_id(&self, parent: Option<&EntityKey>, kind: &str) -> StoreFuture<'_, EntityKey>;

    /// Atomically apply `writes` if every key in `reads` is still at the observed version.
    ///
    /// # Optimistic Concurrency
    ///
    /// Each read entry is `(key, observed)`, where `observed` is `None` when the key
    /// was absent. If any key moved, nothing is written.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: a read key changed since it was observed
    /// - `DatabaseError`: the backend failed
    fn commit(
        &self,
        reads: Vec<(EntityKey, Option<Version>)>,
        writes: Vec<Write>,
    ) -> StoreFuture<'_, ()>;

    /// Atomically apply `writes` without any read guard.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the backend failed
    fn save_atomically(&self, writes: Vec<Write>) -> StoreFuture<'_, ()> {
        self.commit(Vec::new(), writes)
    }
}
