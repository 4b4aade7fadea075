//! Registration core: booking and releasing seats.
//!
//! Register and unregister each run as one transaction that loads the
//! Conference and the caller's Profile, decides, and writes both back
//! together. The decision is re-made from freshly loaded state on every
//! attempt, so a retried transaction never acts on a stale seat count.
//!
//! ```text
//! NotRegistered ──register──▶ Registered ──unregister──▶ NotRegistered
//! ```
//!
//! Expected refusals (already registered, sold out, ...) come back as
//! [`RegistrationOutcome::Conflict`]. Only store failures, exhausted retries
//! and corrupt seat counters are errors.

use super::parse_reference;
use super::profiles::load_or_create_profile;
use crate::error::{ConflictReason, Result, ServiceError};
use crate::metrics;
use crate::types::{Caller, Conference, Profile};
use conference_central_core::EntityKey;
use conference_central_core::store::{Entity, EntityStore};
use conference_central_runtime::{RetryPolicy, Transaction, TransactionError, run_transaction};
use std::fmt;
use std::sync::Arc;

/// Result of a register or unregister call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Seat booked or released
    Success,
    /// Refused for a business reason; nothing changed
    Conflict(ConflictReason),
    /// The conference does not exist
    NotFound,
}

impl RegistrationOutcome {
    /// Label used for metrics and logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Conflict(reason) => reason.code(),
            Self::NotFound => "not_found",
        }
    }

    /// Whether the seat was booked or released
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    Register,
    Unregister,
}

impl Operation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister => "unregister",
        }
    }
}

/// Registration service
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl RegistrationService {
    /// Create a new registration service
    #[must_use]
    pub const fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Book a seat for the caller.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: `reference` is not a conference key
    /// - `InvariantViolation`: stored seat counters are out of bounds
    /// - `Transaction`: store failure or conflicts persisted through every retry
    pub async fn register(&self, caller: &Caller, reference: &str) -> Result<RegistrationOutcome> {
        self.run(Operation::Register, caller, reference).await
    }

    /// Release the caller's seat.
    ///
    /// # Errors
    ///
    /// Same as [`RegistrationService::register`].
    pub async fn unregister(
        &self,
        caller: &Caller,
        reference: &str,
    ) -> Result<RegistrationOutcome> {
        self.run(Operation::Unregister, caller, reference).await
    }

    async fn run(
        &self,
        operation: Operation,
        caller: &Caller,
        reference: &str,
    ) -> Result<RegistrationOutcome> {
        let key = parse_reference(reference, Conference::KIND)?;
        // Attendance lists hold the canonical form, whatever the caller sent.
        let canonical = key.to_string();

        let result = run_transaction(&self.store, key.root(), &self.policy, |tx| {
            let key = key.clone();
            let canonical = canonical.clone();
            async move {
                match operation {
                    Operation::Register => book_seat(tx, caller, &key, &canonical).await,
                    Operation::Unregister => release_seat(tx, caller, &key, &canonical).await,
                }
            }
        })
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(TransactionError::Aborted(reason)) => {
                tracing::error!(
                    conference = %key,
                    user = %caller.user_id,
                    operation = operation.as_str(),
                    %reason,
                    "Seat invariant violated"
                );
                metrics::record_registration(operation.as_str(), "invariant_violation");
                return Err(ServiceError::InvariantViolation {
                    conference: key,
                    reason,
                });
            }
            Err(err) => {
                metrics::record_registration(operation.as_str(), "error");
                return Err(err.into());
            }
        };

        metrics::record_registration(operation.as_str(), outcome.label());
        match outcome {
            RegistrationOutcome::Success => tracing::info!(
                conference = %key,
                user = %caller.user_id,
                operation = operation.as_str(),
                "Registration updated"
            ),
            RegistrationOutcome::Conflict(reason) => tracing::warn!(
                conference = %key,
                user = %caller.user_id,
                operation = operation.as_str(),
                %reason,
                "Registration refused"
            ),
            RegistrationOutcome::NotFound => tracing::warn!(
                conference = %key,
                operation = operation.as_str(),
                "Conference not found"
            ),
        }
        Ok(outcome)
    }
}

/// Commit a read-only attempt and report `outcome`.
async fn settle(
    tx: Transaction,
    outcome: RegistrationOutcome,
) -> std::result::Result<RegistrationOutcome, TransactionError> {
    tx.commit().await?;
    Ok(outcome)
}

async fn load_conference(
    tx: &mut Transaction,
    key: &EntityKey,
) -> std::result::Result<Option<Conference>, TransactionError> {
    let Some(conference) = tx.get::<Conference>(key).await? else {
        return Ok(None);
    };
    conference.check_seats().map_err(TransactionError::aborted)?;
    Ok(Some(conference))
}

async fn book_seat(
    mut tx: Transaction,
    caller: &Caller,
    key: &EntityKey,
    canonical: &str,
) -> std::result::Result<RegistrationOutcome, TransactionError> {
    let Some(mut conference) = load_conference(&mut tx, key).await? else {
        return settle(tx, RegistrationOutcome::NotFound).await;
    };
    let profile_key = Profile::key_for(&caller.user_id);
    let mut profile = load_or_create_profile(&mut tx, &profile_key, caller).await?;

    if profile.is_attending(canonical) {
        return settle(tx, RegistrationOutcome::Conflict(ConflictReason::AlreadyRegistered)).await;
    }
    if conference.seats_available() == 0 {
        return settle(tx, RegistrationOutcome::Conflict(ConflictReason::SoldOut)).await;
    }

    conference.book_seats(1).map_err(TransactionError::aborted)?;
    profile.add_attendance(canonical);
    tx.put(&conference)?;
    tx.put(&profile)?;
    tx.commit().await?;
    Ok(RegistrationOutcome::Success)
}

async fn release_seat(
    mut tx: Transaction,
    caller: &Caller,
    key: &EntityKey,
    canonical: &str,
) -> std::result::Result<RegistrationOutcome, TransactionError> {
    let Some(mut conference) = load_conference(&mut tx, key).await? else {
        return settle(tx, RegistrationOutcome::NotFound).await;
    };
    let profile_key = Profile::key_for(&caller.user_id);
    let mut profile = load_or_create_profile(&mut tx, &profile_key, caller).await?;

    if !profile.is_attending(canonical) {
        return settle(tx, RegistrationOutcome::Conflict(ConflictReason::NotRegistered)).await;
    }
    if conference.seats_available() == conference.max_attendees() {
        return settle(tx, RegistrationOutcome::Conflict(ConflictReason::AtCapacity)).await;
    }

    conference.give_back_seats(1).map_err(TransactionError::aborted)?;
    profile.remove_attendance(canonical);
    tx.put(&conference)?;
    tx.put(&profile)?;
    tx.commit().await?;
    Ok(RegistrationOutcome::Success)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{ConferenceForm, UserId};
    use conference_central_core::store::Write;
    use conference_central_testing::InMemoryEntityStore;
    use std::time::Duration;

    fn service(store: &Arc<InMemoryEntityStore>) -> RegistrationService {
        let policy = RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(1))
            .build();
        RegistrationService::new(Arc::clone(store) as Arc<dyn EntityStore>, policy)
    }

    async fn seed(store: &InMemoryEntityStore, seats: u32) -> String {
        let form = ConferenceForm {
            name: "RustConf".to_string(),
            max_attendees: seats,
            ..ConferenceForm::default()
        }
        .normalized()
        .unwrap();
        let conference = Conference::new(1, &UserId::from("org"), &form);
        store
            .save_atomically(vec![Write::of(&conference).unwrap()])
            .await
            .unwrap();
        conference.websafe_key()
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let store = Arc::new(InMemoryEntityStore::new());
        let reference = seed(&store, 3).await;
        let registration = service(&store);
        let caller = Caller::new("u1", "u1@example.com");

        assert_eq!(
            registration.register(&caller, &reference).await.unwrap(),
            RegistrationOutcome::Success
        );
        assert_eq!(
            registration.register(&caller, &reference).await.unwrap(),
            RegistrationOutcome::Conflict(ConflictReason::AlreadyRegistered)
        );
    }

    #[tokio::test]
    async fn unregister_without_registration_conflicts() {
        let store = Arc::new(InMemoryEntityStore::new());
        let reference = seed(&store, 3).await;
        let caller = Caller::new("u1", "u1@example.com");

        assert_eq!(
            service(&store).unregister(&caller, &reference).await.unwrap(),
            RegistrationOutcome::Conflict(ConflictReason::NotRegistered)
        );
    }

    #[tokio::test]
    async fn missing_conference_is_not_found() {
        let store = Arc::new(InMemoryEntityStore::new());
        let caller = Caller::new("u1", "u1@example.com");

        let outcome = service(&store)
            .register(&caller, "Profile~org/Conference:99")
            .await
            .unwrap();
        assert_eq!(outcome, RegistrationOutcome::NotFound);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn malformed_reference_is_invalid_key() {
        let store = Arc::new(InMemoryEntityStore::new());
        let caller = Caller::new("u1", "u1@example.com");

        let err = service(&store).register(&caller, "Conference:").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidKey { .. }));

        let err = service(&store).register(&caller, "Profile~org").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn persistent_conflicts_surface_as_unavailable() {
        let store = Arc::new(InMemoryEntityStore::new());
        let reference = seed(&store, 3).await;
        store.inject_conflicts(10);
        let caller = Caller::new("u1", "u1@example.com");

        let err = service(&store).register(&caller, &reference).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transaction(TransactionError::Unavailable { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_seat_counter_is_reported_not_clamped() {
        let store = Arc::new(InMemoryEntityStore::new());
        let reference = seed(&store, 3).await;
        let key: EntityKey = reference.parse().unwrap();

        let record = store.load(&key).await.unwrap().unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&record.data).unwrap();
        value["seats_available"] = serde_json::json!(7);
        store
            .save_atomically(vec![Write {
                key: key.clone(),
                data: serde_json::to_vec(&value).unwrap(),
            }])
            .await
            .unwrap();

        let caller = Caller::new("u1", "u1@example.com");
        let err = service(&store).register(&caller, &reference).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvariantViolation { .. }));

        let stored: Conference = store.load(&key).await.unwrap().unwrap().decode().unwrap();
        assert_eq!(stored.seats_available(), 7);
    }

    #[tokio::test]
    async fn unregister_from_empty_conference_is_at_capacity() {
        let store = Arc::new(InMemoryEntityStore::new());
        let reference = seed(&store, 3).await;
        let key: EntityKey = reference.parse().unwrap();
        let caller = Caller::new("u1", "u1@example.com");

        // Attendance entry without a booked seat behind it.
        let mut profile = Profile::for_caller(&caller);
        profile.add_attendance(&reference);
        store
            .save_atomically(vec![Write::of(&profile).unwrap()])
            .await
            .unwrap();
        let profile_key = Profile::key_for(&caller.user_id);
        let versions = || async {
            (
                store.load(&key).await.unwrap().unwrap().version,
                store.load(&profile_key).await.unwrap().unwrap().version,
            )
        };
        let before = versions().await;

        assert_eq!(
            service(&store).unregister(&caller, &reference).await.unwrap(),
            RegistrationOutcome::Conflict(ConflictReason::AtCapacity)
        );

        assert_eq!(versions().await, before);
        let stored: Profile = store.load(&profile_key).await.unwrap().unwrap().decode().unwrap();
        assert!(stored.is_attending(&reference));
        let conference: Conference = store.load(&key).await.unwrap().unwrap().decode().unwrap();
        assert_eq!(conference.seats_available(), 3);
    }

    #[test]
    fn outcome_labels_match_reason_codes() {
        assert_eq!(RegistrationOutcome::Success.label(), "success");
        assert_eq!(
            RegistrationOutcome::Conflict(ConflictReason::SoldOut).label(),
            "sold_out"
        );
        assert_eq!(RegistrationOutcome::NotFound.to_string(), "not_found");
    }
}
