//! Conference Central: conference registration with bounded seats.
//!
//! Organizers publish conferences with a fixed capacity; attendees book and
//! release seats. The difficult part is keeping each conference's seat counter
//! correct under concurrent registration while two derived views stay
//! consistent with it: each attendee's list of conferences, and a periodically
//! refreshed "nearly sold out" announcement.
//!
//! # Architecture
//!
//! ```text
//!            ┌───────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! caller ──▶ │ RegistrationCore  │   │ SessionCreation  │   │  Announcement    │
//!            │ Conference+Profile│   │ Session, then    │   │  Refresher       │
//!            │ in one transaction│   │ speaker links    │   │  (scan + cache)  │
//!            └─────────┬─────────┘   └────────┬─────────┘   └────┬────────┬────┘
//!                      │                      │                  │        │
//!                      ▼                      ▼                  ▼        ▼
//!            ┌──────────────────────────────────────────────────────┐ ┌───────┐
//!            │ EntityStore (optimistic commits, run_transaction)    │ │ Cache │
//!            └──────────────────────────────────────────────────────┘ └───────┘
//! ```
//!
//! # Key ownership
//!
//! ```text
//! Profile~<user>                       attendance list
//! └── Conference:<id>                  seats_available, max_attendees
//!     └── Session:<id>
//! Speaker~<name>                       session keys (reference only)
//! ```
//!
//! # Invariants
//!
//! - `0 <= seats_available <= max_attendees` for every conference
//! - `max_attendees - seats_available` equals the number of profiles attending
//! - registering twice is a conflict, not a no-op
//!
//! # Example
//!
//! ```ignore
//! let app = ConferenceApp::new(store, cache, &Config::from_env());
//! let conference = app.profiles().create_conference(&organizer, form).await?;
//! let outcome = app.registration().register(&attendee, &conference.websafe_key()).await?;
//! assert_eq!(outcome, RegistrationOutcome::Success);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use app::{
    AnnouncementRefresher, ConferenceApp, ProfileService, RefreshOutcome, RegistrationOutcome,
    RegistrationService, SessionService, spawn_refresh_loop,
};
pub use config::Config;
pub use error::{ConflictReason, FormError, SeatInvariantError, ServiceError};
pub use types::*;
