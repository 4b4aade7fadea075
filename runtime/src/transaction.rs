//! Optimistic transactions with bounded automatic retry.
//!
//! A [`Transaction`] buffers reads and writes against an [`EntityStore`]. Every
//! read records the version it observed; [`Transaction::commit`] hands the read
//! set and the write set to the store, which applies all writes or none.
//!
//! [`run_transaction`] re-runs a unit of work from scratch, with a fresh
//! transaction, whenever the commit reports a write conflict. Business decisions
//! made inside the work are therefore always re-evaluated against freshly loaded
//! state, never resumed from a stale attempt.
//!
//! # Example
//!
//! ```ignore
//! let outcome = run_transaction(&store, &group, &policy, |mut tx| async move {
//!     let mut conference: Conference = tx.get(&key).await?.ok_or(...)?;
//!     conference.book_seats(1).map_err(TransactionError::aborted)?;
//!     tx.put(&conference)?;
//!     tx.commit().await?;
//!     Ok(())
//! }).await?;
//! ```

use crate::retry::{RetryPolicy, retry_with_predicate};
use conference_central_core::store::{Entity, EntityStore, StoreError, Write, decode};
use conference_central_core::{EntityKey, Version};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a transactional unit of work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The store failed (or, inside an attempt, reported a conflict).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Write conflicts persisted through every allowed attempt.
    #[error("Entity group {group} unavailable: write conflict persisted after {attempts} attempts")]
    Unavailable {
        /// Entity group the transaction was scoped to.
        group: EntityKey,
        /// Number of attempts made.
        attempts: usize,
    },

    /// The work aborted on purpose; never retried.
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl TransactionError {
    /// Abort the current transaction with a reason.
    pub fn aborted(reason: impl fmt::Display) -> Self {
        Self::Aborted(reason.to_string())
    }

    const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

/// A single optimistic transaction attempt.
pub struct Transaction {
    store: Arc<dyn EntityStore>,
    group: EntityKey,
    reads: BTreeMap<EntityKey, Option<Version>>,
    writes: BTreeMap<EntityKey, Vec<u8>>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("group", &self.group)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// Start a transaction scoped to `group`.
    #[must_use]
    pub const fn begin(store: Arc<dyn EntityStore>, group: EntityKey) -> Self {
        Self {
            store,
            group,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Entity group this transaction is scoped to.
    #[must_use]
    pub const fn group(&self) -> &EntityKey {
        &self.group
    }

    /// Load an entity, recording the version observed.
    ///
    /// Keys already written in this transaction return the pending value.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or `SerializationError` if the entity does not decode.
    pub async fn get<E: Entity>(&mut self, key: &EntityKey) -> Result<Option<E>, StoreError> {
        if let Some(data) = self.writes.get(key) {
            return decode(data).map(Some);
        }

        let record = self.store.load(key).await?;
        self.reads
            .entry(key.clone())
            .or_insert_with(|| record.as_ref().map(|r| r.version));
        record.map(|r| r.decode()).transpose()
    }

    /// Buffer a write of `entity` under its own key.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be encoded.
    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<(), StoreError> {
        let write = Write::of(entity)?;
        self.writes.insert(write.key, write.data);
        Ok(())
    }

    /// Allocate a fresh numeric key. Allocation is not rolled back on abort.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn allocate_id(
        &self,
        parent: Option<&EntityKey>,
        kind: &str,
    ) -> Result<EntityKey, StoreError> {
        self.store.allocate_id(parent, kind).await
    }

    /// Commit the buffered writes, guarded by every version observed.
    ///
    /// A transaction with no writes still validates its reads, so a read-only
    /// decision is known to be based on the latest committed state.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: something this transaction read has changed
    /// - any other store error
    pub async fn commit(self) -> Result<(), StoreError> {
        let reads = self.reads.into_iter().collect();
        let writes = self
            .writes
            .into_iter()
            .map(|(key, data)| Write { key, data })
            .collect();
        self.store.commit(reads, writes).await
    }
}

/// Run `work` in a transaction scoped to `group`, retrying on write conflict.
///
/// Each attempt receives a fresh [`Transaction`] and must commit it itself.
/// Only `ConcurrencyConflict` store errors are retried, with the backoff of
/// `policy`; once the budget is spent the conflict is escalated to
/// [`TransactionError::Unavailable`].
///
/// # Errors
///
/// - `Unavailable`: conflicts persisted through every attempt
/// - `Store`: a non-conflict store failure
/// - `Aborted`: the work aborted
pub async fn run_transaction<F, Fut, T>(
    store: &Arc<dyn EntityStore>,
    group: &EntityKey,
    policy: &RetryPolicy,
    mut work: F,
) -> Result<T, TransactionError>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<T, TransactionError>>,
{
    let mut attempts = 0_usize;
    let result = retry_with_predicate(
        policy,
        || {
            attempts += 1;
            work(Transaction::begin(Arc::clone(store), group.clone()))
        },
        TransactionError::is_retryable,
    )
    .await;

    match result {
        Err(err) if err.is_retryable() => {
            tracing::error!(%group, attempts, "Transaction gave up after repeated write conflicts");
            Err(TransactionError::Unavailable {
                group: group.clone(),
                attempts,
            })
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conference_central_testing::InMemoryEntityStore;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Counter {
        name: String,
        value: u32,
    }

    impl Entity for Counter {
        const KIND: &'static str = "Counter";

        fn key(&self) -> EntityKey {
            EntityKey::named(Self::KIND, &self.name)
        }
    }

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build()
    }

    async fn increment(mut tx: Transaction, key: EntityKey) -> Result<u32, TransactionError> {
        let mut counter: Counter = tx
            .get(&key)
            .await?
            .ok_or_else(|| TransactionError::aborted("counter missing"))?;
        counter.value += 1;
        tx.put(&counter)?;
        tx.commit().await?;
        Ok(counter.value)
    }

    async fn seeded_store() -> (Arc<InMemoryEntityStore>, EntityKey) {
        let store = Arc::new(InMemoryEntityStore::new());
        let counter = Counter {
            name: "hits".to_string(),
            value: 0,
        };
        store
            .save_atomically(vec![Write::of(&counter).unwrap()])
            .await
            .unwrap();
        (store, counter.key())
    }

    #[tokio::test]
    async fn reads_see_pending_writes() {
        let (store, key) = seeded_store().await;
        let dyn_store: Arc<dyn EntityStore> = store;
        let mut tx = Transaction::begin(Arc::clone(&dyn_store), key.clone());

        let mut counter: Counter = tx.get(&key).await.unwrap().unwrap();
        counter.value = 7;
        tx.put(&counter).unwrap();

        let again: Counter = tx.get(&key).await.unwrap().unwrap();
        assert_eq!(again.value, 7);
    }

    #[tokio::test]
    async fn stale_read_fails_commit() {
        let (store, key) = seeded_store().await;
        let dyn_store: Arc<dyn EntityStore> = store;

        let mut slow = Transaction::begin(Arc::clone(&dyn_store), key.clone());
        let mut counter: Counter = slow.get(&key).await.unwrap().unwrap();

        let fast = Transaction::begin(Arc::clone(&dyn_store), key.clone());
        increment(fast, key.clone()).await.unwrap();

        counter.value = 100;
        slow.put(&counter).unwrap();
        let err = slow.commit().await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn run_transaction_retries_conflicts() {
        let (store, key) = seeded_store().await;
        store.inject_conflicts(2);
        let dyn_store: Arc<dyn EntityStore> = store;

        let value = run_transaction(&dyn_store, &key, &policy(3), |tx| increment(tx, key.clone()))
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn run_transaction_escalates_to_unavailable() {
        let (store, key) = seeded_store().await;
        store.inject_conflicts(10);
        let dyn_store: Arc<dyn EntityStore> = store;

        let err = run_transaction(&dyn_store, &key, &policy(2), |tx| increment(tx, key.clone()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransactionError::Unavailable {
                group: key.clone(),
                attempts: 3,
            }
        );
    }

    #[tokio::test]
    async fn aborted_work_is_not_retried() {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
        let key = EntityKey::named(Counter::KIND, "missing");
        let mut calls = 0;

        let err = run_transaction(&store, &key, &policy(5), |tx| {
            calls += 1;
            increment(tx, key.clone())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TransactionError::Aborted(_)));
        assert_eq!(calls, 1);
    }
}
