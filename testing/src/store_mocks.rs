//! In-memory entity store and cache for tests and demos.
//!
//! - [`InMemoryEntityStore`]: versioned `BTreeMap` storage with serializable,
//!   optimistic commits and conflict injection
//! - [`InMemoryCache`]: `HashMap` string cache with failure injection

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use conference_central_core::cache::{Cache, CacheError, CacheFuture};
use conference_central_core::store::{EntityStore, Record, StoreError, StoreFuture, Write};
use conference_central_core::{EntityKey, Version};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct StoreInner {
    records: BTreeMap<EntityKey, (Version, Vec<u8>)>,
    next_ids: HashMap<String, u64>,
    commits: usize,
}

/// In-memory entity store for fast, deterministic testing.
///
/// Every commit runs under one write lock: the read set is validated and the
/// write set applied together, so concurrent transactions are serializable.
///
/// # Example
///
/// ```
/// use conference_central_testing::InMemoryEntityStore;
/// use conference_central_core::store::EntityStore;
/// use conference_central_core::EntityKey;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEntityStore::new();
/// let key = store.allocate_id(None, "Conference").await?;
/// assert!(store.load(&key).await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    inner: Arc<RwLock<StoreInner>>,
    injected_conflicts: Arc<AtomicUsize>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with `ConcurrencyConflict`.
    ///
    /// Useful for exercising retry exhaustion without real contention.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.inner.read().unwrap().commits
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().records.is_empty()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(key: &EntityKey, entry: &(Version, Vec<u8>)) -> Record {
        Record {
            key: key.clone(),
            version: entry.0,
            data: entry.1.clone(),
        }
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, key: &EntityKey) -> StoreFuture<'_, Option<Record>> {
        let key = key.clone();
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            Ok(inner.records.get(&key).map(|entry| Self::record(&key, entry)))
        })
    }

    fn load_by_parent(&self, parent: &EntityKey, kind: &str) -> StoreFuture<'_, Vec<Record>> {
        let parent = parent.clone();
        let kind = kind.to_string();
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .records
                .iter()
                .filter(|(key, _)| key.kind() == kind && key.parent() == Some(&parent))
                .map(|(key, entry)| Self::record(key, entry))
                .collect())
        })
    }

    fn load_kind(&self, kind: &str) -> StoreFuture<'_, Vec<Record>> {
        let kind = kind.to_string();
        Box::pin(async move {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .records
                .iter()
                .filter(|(key, _)| key.kind() == kind)
                .map(|(key, entry)| Self::record(key, entry))
                .collect())
        })
    }

    fn allocate_id(&self, parent: Option<&EntityKey>, kind: &str) -> StoreFuture<'_, EntityKey> {
        let parent = parent.cloned();
        let kind = kind.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();
            let next = inner.next_ids.entry(kind.clone()).or_insert(0);
            *next += 1;
            let id = *next;
            Ok(match parent {
                Some(parent) => parent.child_with_id(kind, id),
                None => EntityKey::with_id(kind, id),
            })
        })
    }

    fn commit(
        &self,
        reads: Vec<(EntityKey, Option<Version>)>,
        writes: Vec<Write>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().unwrap();

            // An empty commit has no key to conflict on and leaves the injection armed.
            let target = reads
                .first()
                .map(|(key, _)| key.clone())
                .or_else(|| writes.first().map(|w| w.key.clone()));
            if let Some(key) = target {
                if self.take_injected_conflict() {
                    let actual = inner.records.get(&key).map(|(version, _)| *version);
                    return Err(StoreError::ConcurrencyConflict {
                        key,
                        expected: actual,
                        actual,
                    });
                }
            }

            for (key, expected) in &reads {
                let actual = inner.records.get(key).map(|(version, _)| *version);
                if actual != *expected {
                    return Err(StoreError::ConcurrencyConflict {
                        key: key.clone(),
                        expected: *expected,
                        actual,
                    });
                }
            }

            for write in writes {
                let version = inner
                    .records
                    .get(&write.key)
                    .map_or(Version::INITIAL, |(version, _)| version.next());
                inner.records.insert(write.key, (version, write.data));
            }
            inner.commits += 1;
            Ok(())
        })
    }
}

/// In-memory string cache.
///
/// # Example
///
/// ```
/// use conference_central_testing::InMemoryCache;
/// use conference_central_core::cache::Cache;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = InMemoryCache::new();
/// cache.put("greeting", "hello".to_string()).await?;
/// assert_eq!(cache.get("greeting").await?, Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    data: Arc<RwLock<HashMap<String, String>>>,
    injected_failures: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
}

impl InMemoryCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` puts fail with `Unavailable`.
    pub fn inject_failures(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful puts so far.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> CacheFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.data.read().unwrap().get(&key).cloned()) })
    }

    fn put(&self, key: &str, value: String) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let failed = self
                .injected_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(CacheError::Unavailable("injected failure".to_string()));
            }
            self.data.write().unwrap().insert(key, value);
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
