//! # Conference Central Runtime
//!
//! Transaction execution for Conference Central.
//!
//! ## Core Components
//!
//! - **Transaction**: buffers reads (with observed versions) and writes, commits atomically
//! - **`run_transaction`**: re-runs a unit of work from scratch on write conflict, with
//!   exponential backoff and a bounded attempt count
//! - **Retry policy**: backoff configuration shared by transactions and cache publishing
//!
//! ## Example
//!
//! ```ignore
//! use conference_central_runtime::{RetryPolicy, run_transaction};
//!
//! let seats_left = run_transaction(&store, conference_key.root(), &RetryPolicy::default(), |tx| {
//!     book_one_seat(tx, conference_key.clone())
//! })
//! .await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Optimistic transactions over an entity store
pub mod transaction;

pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_backoff, retry_with_predicate};
pub use transaction::{Transaction, TransactionError, run_transaction};
