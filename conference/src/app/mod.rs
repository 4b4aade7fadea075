//! Application services.
//!
//! Each service holds the shared store handle and retry policy and runs its
//! mutations through [`run_transaction`](conference_central_runtime::run_transaction):
//!
//! - [`ProfileService`]: profiles and conference CRUD
//! - [`RegistrationService`]: seat booking and release
//! - [`SessionService`]: session creation and speaker linking
//! - [`AnnouncementRefresher`]: "nearly sold out" summary for the cache
//!
//! [`ConferenceApp`] builds all four from one store, one cache and a [`Config`].

pub mod announcement;
pub mod profiles;
pub mod registration;
pub mod sessions;

pub use announcement::{
    AnnouncementRefresher, MIN_REFRESH_INTERVAL, RefreshOutcome, spawn_refresh_loop,
};
pub use profiles::ProfileService;
pub use registration::{RegistrationOutcome, RegistrationService};
pub use sessions::SessionService;

use crate::config::Config;
use crate::error::ServiceError;
use conference_central_core::EntityKey;
use conference_central_core::cache::Cache;
use conference_central_core::store::EntityStore;
use std::sync::Arc;

/// All services wired to one store and cache.
#[derive(Clone)]
pub struct ConferenceApp {
    profiles: ProfileService,
    registration: RegistrationService,
    sessions: SessionService,
    announcements: AnnouncementRefresher,
}

impl ConferenceApp {
    /// Wire the services
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn Cache>, config: &Config) -> Self {
        let policy = config.retry_policy();
        Self {
            profiles: ProfileService::new(Arc::clone(&store), policy.clone()),
            registration: RegistrationService::new(Arc::clone(&store), policy.clone()),
            sessions: SessionService::new(Arc::clone(&store), policy.clone()),
            announcements: AnnouncementRefresher::new(store, cache, &config.announcement, policy),
        }
    }

    /// Profile and conference operations
    #[must_use]
    pub const fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    /// Register / unregister
    #[must_use]
    pub const fn registration(&self) -> &RegistrationService {
        &self.registration
    }

    /// Session creation and speaker linking
    #[must_use]
    pub const fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    /// Announcement refresher
    #[must_use]
    pub const fn announcements(&self) -> &AnnouncementRefresher {
        &self.announcements
    }
}

/// Parse a caller-supplied reference and check it names `expected`.
pub(crate) fn parse_reference(
    reference: &str,
    expected: &'static str,
) -> Result<EntityKey, ServiceError> {
    let key: EntityKey = reference
        .parse()
        .map_err(|err| ServiceError::unparsable(expected, reference, &err))?;
    if key.kind() != expected {
        return Err(ServiceError::wrong_kind(expected, reference, &key));
    }
    Ok(key)
}
