//! Profile and conference operations.
//!
//! Profiles are created lazily: the first operation that needs a caller's
//! profile inserts it inside the same transaction that uses it.

use super::parse_reference;
use crate::error::{FormError, Result, ServiceError};
use crate::types::{
    Caller, Conference, ConferenceForm, ConferenceQuery, Profile, ProfileForm, UserId,
};
use conference_central_core::EntityKey;
use conference_central_core::store::{Entity, EntityStore, Record, StoreError};
use conference_central_runtime::{RetryPolicy, Transaction, TransactionError, run_transaction};
use std::sync::Arc;

/// Profile and conference service
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

enum UpdateAttempt {
    Updated(Conference),
    Missing,
    NotOrganizer,
    Rejected(FormError),
}

impl ProfileService {
    /// Create a new profile service
    #[must_use]
    pub const fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Load a profile, if the user has one.
    ///
    /// # Errors
    ///
    /// Returns a store error if the load fails.
    pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        let record = self.store.load(&Profile::key_for(user_id)).await?;
        Ok(record.map(|r| r.decode()).transpose()?)
    }

    /// Create or update the caller's profile.
    ///
    /// Only fields present in `form` are changed on an existing profile.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` if the store fails or conflicts persist.
    pub async fn save_profile(&self, caller: &Caller, form: &ProfileForm) -> Result<Profile> {
        let key = Profile::key_for(&caller.user_id);
        let profile = run_transaction(&self.store, &key, &self.policy, |mut tx| {
            let key = key.clone();
            async move {
                let mut profile = load_or_create_profile(&mut tx, &key, caller).await?;
                profile.apply(form);
                tx.put(&profile)?;
                tx.commit().await?;
                Ok(profile)
            }
        })
        .await?;

        tracing::info!(user = %caller.user_id, "Profile saved");
        Ok(profile)
    }

    /// Create a conference organized by the caller.
    ///
    /// # Errors
    ///
    /// - `InvalidForm`: the name is blank
    /// - `Transaction` / `Store`: persistence failed
    pub async fn create_conference(
        &self,
        caller: &Caller,
        form: ConferenceForm,
    ) -> Result<Conference> {
        let form = form.normalized()?;
        let profile_key = Profile::key_for(&caller.user_id);
        let conference_key = self
            .store
            .allocate_id(Some(&profile_key), Conference::KIND)
            .await?;
        let id = conference_key.id().ok_or_else(|| {
            StoreError::DatabaseError(format!("allocated key {conference_key} has no numeric id"))
        })?;

        let conference = run_transaction(&self.store, &profile_key, &self.policy, |mut tx| {
            let profile_key = profile_key.clone();
            let form = form.clone();
            async move {
                let profile = load_or_create_profile(&mut tx, &profile_key, caller).await?;
                let conference = Conference::new(id, profile.user_id(), &form);
                tx.put(&profile)?;
                tx.put(&conference)?;
                tx.commit().await?;
                Ok(conference)
            }
        })
        .await?;

        tracing::info!(
            conference = %conference.key(),
            organizer = %caller.user_id,
            max_attendees = conference.max_attendees(),
            "Conference created"
        );
        Ok(conference)
    }

    /// Rewrite a conference's details. Only its organizer may do this.
    ///
    /// Returns `None` if the conference does not exist.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: `reference` is not a conference key
    /// - `InvalidForm`: blank name, or capacity below the seats already booked
    /// - `NotOrganizer`: the caller did not create the conference
    /// - `Transaction`: persistence failed
    pub async fn update_conference(
        &self,
        caller: &Caller,
        reference: &str,
        form: ConferenceForm,
    ) -> Result<Option<Conference>> {
        let key = parse_reference(reference, Conference::KIND)?;
        let form = form.normalized()?;

        let attempt = run_transaction(&self.store, key.root(), &self.policy, |mut tx| {
            let key = key.clone();
            let form = form.clone();
            async move {
                let Some(mut conference) = tx.get::<Conference>(&key).await? else {
                    return Ok(UpdateAttempt::Missing);
                };
                if conference.organizer_user_id() != &caller.user_id {
                    return Ok(UpdateAttempt::NotOrganizer);
                }
                if let Err(err) = conference.update_with_form(&form) {
                    return Ok(UpdateAttempt::Rejected(err));
                }
                tx.put(&conference)?;
                tx.commit().await?;
                Ok(UpdateAttempt::Updated(conference))
            }
        })
        .await?;

        match attempt {
            UpdateAttempt::Updated(conference) => {
                tracing::info!(conference = %key, "Conference updated");
                Ok(Some(conference))
            }
            UpdateAttempt::Missing => Ok(None),
            UpdateAttempt::NotOrganizer => {
                tracing::warn!(
                    conference = %key,
                    user = %caller.user_id,
                    "Update by non-organizer refused"
                );
                Err(ServiceError::NotOrganizer {
                    user: caller.user_id.to_string(),
                    conference: key,
                })
            }
            UpdateAttempt::Rejected(err) => Err(err.into()),
        }
    }

    /// Load a conference by reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed reference or a store error.
    pub async fn get_conference(&self, reference: &str) -> Result<Option<Conference>> {
        let key = parse_reference(reference, Conference::KIND)?;
        let record = self.store.load(&key).await?;
        Ok(record.map(|r| r.decode()).transpose()?)
    }

    /// Conferences organized by `user_id`, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a store error if the scan fails.
    pub async fn conferences_created(&self, user_id: &UserId) -> Result<Vec<Conference>> {
        let records = self
            .store
            .load_by_parent(&Profile::key_for(user_id), Conference::KIND)
            .await?;
        let mut conferences = decode_all::<Conference>(&records)?;
        conferences.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(conferences)
    }

    /// Every conference passing `query`, ordered by name.
    ///
    /// Scans all conferences; filters are applied in memory.
    ///
    /// # Errors
    ///
    /// Returns a store error if the scan fails.
    pub async fn query_conferences(&self, query: &ConferenceQuery) -> Result<Vec<Conference>> {
        let records = self.store.load_kind(Conference::KIND).await?;
        let mut conferences: Vec<Conference> = decode_all::<Conference>(&records)?
            .into_iter()
            .filter(|conference| query.matches(conference))
            .collect();
        conferences.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(
            matched = conferences.len(),
            scanned = records.len(),
            "Conferences queried"
        );
        Ok(conferences)
    }

    /// Conferences `user_id` is registered for, in registration order.
    ///
    /// References that no longer resolve are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if a load fails.
    pub async fn conferences_to_attend(&self, user_id: &UserId) -> Result<Vec<Conference>> {
        let Some(profile) = self.get_profile(user_id).await? else {
            return Ok(Vec::new());
        };

        let mut conferences = Vec::with_capacity(profile.conference_keys_to_attend().len());
        for reference in profile.conference_keys_to_attend() {
            let key = match reference.parse::<EntityKey>() {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(
                        user = %user_id,
                        reference,
                        error = %err,
                        "Unparsable attendance entry skipped"
                    );
                    continue;
                }
            };
            match self.store.load(&key).await? {
                Some(record) => conferences.push(record.decode()?),
                None => {
                    tracing::warn!(
                        user = %user_id,
                        conference = %key,
                        "Attended conference no longer exists"
                    );
                }
            }
        }
        Ok(conferences)
    }
}

/// Load the caller's profile inside `tx`, or build the default one.
pub(crate) async fn load_or_create_profile(
    tx: &mut Transaction,
    key: &EntityKey,
    caller: &Caller,
) -> std::result::Result<Profile, TransactionError> {
    Ok(tx
        .get::<Profile>(key)
        .await?
        .unwrap_or_else(|| Profile::for_caller(caller)))
}

pub(crate) fn decode_all<E: Entity>(records: &[Record]) -> Result<Vec<E>> {
    Ok(records
        .iter()
        .map(|record| record.decode::<E>())
        .collect::<std::result::Result<Vec<_>, _>>()?)
}
