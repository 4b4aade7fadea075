//! # Conference Central Core
//!
//! Storage abstractions shared by every Conference Central crate.
//!
//! ## Core Concepts
//!
//! - **`EntityKey`**: hierarchical key; the root ancestor is the entity group
//! - **`Entity`**: a serializable value that knows its own key
//! - **`EntityStore`**: versioned key-value store with optimistic, atomic commits
//! - **`Cache`**: string key-value cache for derived values
//!
//! Transactions with automatic retry live in `conference-central-runtime`; in-memory
//! implementations of both traits live in `conference-central-testing`.
//!
//! ## Example
//!
//! ```ignore
//! use conference_central_core::{EntityKey, store::EntityStore};
//!
//! async fn show<S: EntityStore>(store: &S) -> Result<(), StoreError> {
//!     let key = EntityKey::named("Profile", "alice");
//!     if let Some(record) = store.load(&key).await? {
//!         println!("{} at version {}", record.key, record.version);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod key;
pub mod store;

pub use key::{EntityKey, KeyName, ParseKeyError, Version};
pub use store::{Entity, EntityStore, Record, StoreError, Write};
