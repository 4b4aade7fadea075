//! Registration and conference management scenarios.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::{TimeZone, Utc};
use conference_central::{
    Caller, ConferenceApp, ConferenceForm, ConferenceQuery, ConflictReason, Config, FormError,
    ProfileForm, RegistrationOutcome, ServiceError, TeeShirtSize,
};
use conference_central_core::cache::Cache;
use conference_central_core::store::EntityStore;
use conference_central_testing::{InMemoryCache, InMemoryEntityStore};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn app() -> ConferenceApp {
    let store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
    ConferenceApp::new(store, cache, &Config::default())
}

fn organizer() -> Caller {
    Caller::new("organizer", "organizer@example.com")
}

fn form(name: &str, max_attendees: u32) -> ConferenceForm {
    ConferenceForm {
        name: name.to_string(),
        max_attendees,
        ..ConferenceForm::default()
    }
}

/// Scenario: two seats, three attendees, one releases.
#[tokio::test]
async fn test_two_seat_scenario() {
    let app = app();
    let conference = app
        .profiles()
        .create_conference(&organizer(), form("Tiny Conf", 2))
        .await
        .unwrap();
    let reference = conference.websafe_key();
    assert_eq!(conference.seats_available(), 2);

    let a = Caller::new("a", "a@example.com");
    let b = Caller::new("b", "b@example.com");
    let c = Caller::new("c", "c@example.com");
    let registration = app.registration();
    let seats = || async {
        app.profiles()
            .get_conference(&reference)
            .await
            .unwrap()
            .unwrap()
            .seats_available()
    };

    assert_eq!(registration.register(&a, &reference).await.unwrap(), RegistrationOutcome::Success);
    assert_eq!(seats().await, 1);

    assert_eq!(registration.register(&b, &reference).await.unwrap(), RegistrationOutcome::Success);
    assert_eq!(seats().await, 0);

    assert_eq!(
        registration.register(&c, &reference).await.unwrap(),
        RegistrationOutcome::Conflict(ConflictReason::SoldOut)
    );
    assert_eq!(seats().await, 0);

    assert_eq!(
        registration.unregister(&a, &reference).await.unwrap(),
        RegistrationOutcome::Success
    );
    assert_eq!(seats().await, 1);
}

/// Register then unregister restores the seat count and the attendance list.
#[tokio::test]
async fn test_register_unregister_round_trip() {
    let app = app();
    let first = app
        .profiles()
        .create_conference(&organizer(), form("First", 10))
        .await
        .unwrap()
        .websafe_key();
    let second = app
        .profiles()
        .create_conference(&organizer(), form("Second", 10))
        .await
        .unwrap()
        .websafe_key();

    let attendee = Caller::new("attendee", "attendee@example.com");
    app.registration().register(&attendee, &first).await.unwrap();
    let before = app.profiles().get_profile(&attendee.user_id).await.unwrap().unwrap();
    let seats_before = app
        .profiles()
        .get_conference(&second)
        .await
        .unwrap()
        .unwrap()
        .seats_available();

    assert!(app.registration().register(&attendee, &second).await.unwrap().is_success());
    assert!(app.registration().unregister(&attendee, &second).await.unwrap().is_success());

    let after = app.profiles().get_profile(&attendee.user_id).await.unwrap().unwrap();
    let seats_after = app
        .profiles()
        .get_conference(&second)
        .await
        .unwrap()
        .unwrap()
        .seats_available();
    assert_eq!(after.conference_keys_to_attend(), before.conference_keys_to_attend());
    assert_eq!(seats_after, seats_before);

    assert_eq!(
        app.registration().unregister(&attendee, &second).await.unwrap(),
        RegistrationOutcome::Conflict(ConflictReason::NotRegistered)
    );
}

/// Escaped references survive the trip through the attendance list.
#[tokio::test]
async fn test_escaped_reference_round_trips_through_attendance() {
    let app = app();
    let conference = app
        .profiles()
        .create_conference(&Caller::new("org/with/slash", "o@example.com"), form("Escaped", 3))
        .await
        .unwrap();
    let canonical = conference.websafe_key();
    assert!(canonical.starts_with("Profile~org%2Fwith%2Fslash/"));

    let attendee = Caller::new("attendee", "attendee@example.com");
    assert_ok!(app.registration().register(&attendee, &canonical).await);

    let profile = app.profiles().get_profile(&attendee.user_id).await.unwrap().unwrap();
    assert_eq!(profile.conference_keys_to_attend(), [canonical.clone()]);

    let attending = app.profiles().conferences_to_attend(&attendee.user_id).await.unwrap();
    assert_eq!(attending.len(), 1);
    assert_eq!(attending[0].name, "Escaped");
}

/// Conference creation fills defaults and creates the organizer profile lazily.
#[tokio::test]
async fn test_create_conference_defaults_and_lazy_profile() {
    let app = app();
    let organizer = Caller::new("grace", "grace@example.com");
    assert!(app.profiles().get_profile(&organizer.user_id).await.unwrap().is_none());

    let conference = app
        .profiles()
        .create_conference(
            &organizer,
            ConferenceForm {
                name: "  Spaced Out  ".to_string(),
                start_date: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()),
                max_attendees: 40,
                ..ConferenceForm::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(conference.name, "Spaced Out");
    assert_eq!(conference.topics, ["Default", "Topic"]);
    assert_eq!(conference.city, "Default City");
    assert_eq!(conference.month, 3);
    assert_eq!(conference.seats_available(), 40);

    let profile = app.profiles().get_profile(&organizer.user_id).await.unwrap().unwrap();
    assert_eq!(profile.display_name, "grace");
    assert_eq!(profile.tee_shirt_size, TeeShirtSize::NotSpecified);

    let err = app
        .profiles()
        .create_conference(&organizer, form(" ", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidForm(FormError::MissingName)));
}

/// Conferences created by a user come back ordered by name.
#[tokio::test]
async fn test_conferences_created_sorted_by_name() {
    let app = app();
    for name in ["Zed", "Alpha", "Mid"] {
        app.profiles().create_conference(&organizer(), form(name, 1)).await.unwrap();
    }
    app.profiles()
        .create_conference(&Caller::new("other", "other@example.com"), form("Other", 1))
        .await
        .unwrap();

    let names: Vec<String> = app
        .profiles()
        .conferences_created(&organizer().user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["Alpha", "Mid", "Zed"]);
}

/// Only the organizer may update, and capacity cannot drop below booked seats.
#[tokio::test]
async fn test_update_conference_rules() {
    let app = app();
    let reference = app
        .profiles()
        .create_conference(&organizer(), form("Growing", 3))
        .await
        .unwrap()
        .websafe_key();
    for user in ["a", "b"] {
        let caller = Caller::new(user, format!("{user}@example.com"));
        app.registration().register(&caller, &reference).await.unwrap();
    }

    let stranger = Caller::new("stranger", "stranger@example.com");
    let err = app
        .profiles()
        .update_conference(&stranger, &reference, form("Hijacked", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotOrganizer { .. }));

    let err = app
        .profiles()
        .update_conference(&organizer(), &reference, form("Growing", 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InvalidForm(FormError::CapacityBelowBooked { booked: 2, requested: 1 })
    ));

    let updated = app
        .profiles()
        .update_conference(&organizer(), &reference, form("Grown", 10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Grown");
    assert_eq!(updated.max_attendees(), 10);
    assert_eq!(updated.seats_available(), 8);

    let missing = app
        .profiles()
        .update_conference(&organizer(), "Profile~organizer/Conference:999", form("Ghost", 1))
        .await
        .unwrap();
    assert!(missing.is_none());
}

/// Saving a profile only changes the fields supplied.
#[tokio::test]
async fn test_save_profile_partial_update() {
    let app = app();
    let caller = Caller::new("pat", "pat@example.com");

    let created = app
        .profiles()
        .save_profile(
            &caller,
            &ProfileForm {
                display_name: None,
                tee_shirt_size: Some(TeeShirtSize::M),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.display_name, "pat");
    assert_eq!(created.tee_shirt_size, TeeShirtSize::M);

    let renamed = app
        .profiles()
        .save_profile(
            &caller,
            &ProfileForm {
                display_name: Some("Pat S.".to_string()),
                tee_shirt_size: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.display_name, "Pat S.");
    assert_eq!(renamed.tee_shirt_size, TeeShirtSize::M);
}

/// A reference to another kind of entity is rejected before any transaction.
#[tokio::test]
async fn test_wrong_kind_reference_rejected() {
    let app = app();
    let caller = Caller::new("a", "a@example.com");
    assert_err!(app.registration().register(&caller, "Profile~organizer").await);
    assert_err!(app.profiles().get_conference("").await);
}

/// Queries filter every organizer's conferences by city, topic and month.
#[tokio::test]
async fn test_query_conferences_filters_across_organizers() {
    let app = app();
    let other = Caller::new("other", "other@example.com");
    let in_city = |name: &str, city: &str, month: u32| ConferenceForm {
        city: Some(city.to_string()),
        topics: vec!["Rust".to_string()],
        start_date: Some(Utc.with_ymd_and_hms(2026, month, 10, 9, 0, 0).unwrap()),
        ..form(name, 50)
    };

    for (caller, conference) in [
        (organizer(), in_city("Zen of Rust", "Tokyo", 6)),
        (other.clone(), in_city("Async Tokyo", "Tokyo", 11)),
        (other, in_city("Paris Rust", "Paris", 6)),
    ] {
        assert_ok!(app.profiles().create_conference(&caller, conference).await);
    }
    app.profiles()
        .create_conference(&organizer(), form("Untagged", 50))
        .await
        .unwrap();

    let names = |conferences: Vec<conference_central::Conference>| {
        conferences.into_iter().map(|c| c.name).collect::<Vec<_>>()
    };

    let all = app.profiles().query_conferences(&ConferenceQuery::default()).await.unwrap();
    assert_eq!(names(all), ["Async Tokyo", "Paris Rust", "Untagged", "Zen of Rust"]);

    let tokyo = ConferenceQuery {
        city: Some("Tokyo".to_string()),
        ..ConferenceQuery::default()
    };
    let found = app.profiles().query_conferences(&tokyo).await.unwrap();
    assert_eq!(names(found), ["Async Tokyo", "Zen of Rust"]);

    let june_rust = ConferenceQuery {
        topic: Some("Rust".to_string()),
        month: Some(6),
        ..ConferenceQuery::default()
    };
    let found = app.profiles().query_conferences(&june_rust).await.unwrap();
    assert_eq!(names(found), ["Paris Rust", "Zen of Rust"]);
}
