//! # Conference Central Testing
//!
//! In-memory implementations of the core storage traits.
//!
//! This crate provides:
//! - [`InMemoryEntityStore`]: serializable, optimistic commits plus conflict injection
//! - [`InMemoryCache`]: string cache plus failure injection
//!
//! The demo binary runs on the same implementations.
//!
//! ## Example
//!
//! ```ignore
//! use conference_central_testing::{InMemoryCache, InMemoryEntityStore};
//!
//! #[tokio::test]
//! async fn test_registration_flow() {
//!     let store = Arc::new(InMemoryEntityStore::new());
//!     let cache = Arc::new(InMemoryCache::new());
//!     let app = ConferenceApp::new(store.clone(), cache, &Config::default());
//!
//!     let outcome = app.registration().register(&caller, &conference_ref).await.unwrap();
//!     assert_eq!(outcome, RegistrationOutcome::Success);
//! }
//! ```

/// In-memory store and cache implementations
pub mod store_mocks;

// Re-export commonly used items
pub use store_mocks::{InMemoryCache, InMemoryEntityStore};
