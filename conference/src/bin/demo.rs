//! Conference Central demo
//!
//! Runs the registration scenario against an in-memory store:
//! - a two-seat conference is created
//! - two attendees register, a third is turned away, one releases their seat
//! - a session with repeated speakers is created
//! - the announcement refresher runs for a few ticks
//!
//! # Usage
//!
//! ```bash
//! ANNOUNCEMENT_REFRESH_INTERVAL_SECS=1 cargo run --bin conference-demo
//! ```

use conference_central::{
    Caller, ConferenceApp, ConferenceForm, Config, SessionForm, metrics::register_metrics,
};
use conference_central_core::cache::Cache;
use conference_central_core::store::EntityStore;
use conference_central_testing::{InMemoryCache, InMemoryEntityStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    register_metrics();

    let store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
    let app = ConferenceApp::new(store, cache, &config);

    // ========== Registration ==========

    let organizer = Caller::new("organizer", "organizer@example.com");
    let conference = app
        .profiles()
        .create_conference(
            &organizer,
            ConferenceForm {
                name: "RustConf".to_string(),
                description: Some("Two seats only".to_string()),
                max_attendees: 2,
                ..ConferenceForm::default()
            },
        )
        .await?;
    let reference = conference.websafe_key();
    tracing::info!(%reference, "Demo conference ready");

    let alice = Caller::new("alice", "alice@example.com");
    let bob = Caller::new("bob", "bob@example.com");
    let carol = Caller::new("carol", "carol@example.com");

    let steps = [
        (&alice, "A registers"),
        (&bob, "B registers"),
        (&carol, "C registers"),
    ];
    for (caller, step) in steps {
        let outcome = app.registration().register(caller, &reference).await?;
        tracing::info!(step, %outcome, "Registration step");
    }
    let outcome = app.registration().unregister(&alice, &reference).await?;
    tracing::info!(step = "A unregisters", %outcome, "Registration step");

    if let Some(current) = app.profiles().get_conference(&reference).await? {
        tracing::info!(
            seats_available = current.seats_available(),
            max_attendees = current.max_attendees(),
            "Seats after scenario"
        );
    }

    // ========== Sessions ==========

    let session = app
        .sessions()
        .create_session(
            &reference,
            SessionForm {
                name: "Fearless Concurrency".to_string(),
                speakers: vec!["Alice".to_string(), "Bob".to_string(), "Alice".to_string()],
                duration_minutes: Some(45),
                ..SessionForm::default()
            },
        )
        .await?;
    if let Some(session) = session {
        for name in ["Alice", "Bob"] {
            if let Some(speaker) = app.sessions().speaker(name).await? {
                tracing::info!(
                    speaker = name,
                    session = %session.name,
                    entries = speaker.sessions().len(),
                    "Speaker linked"
                );
            }
        }
    }

    // ========== Announcements ==========

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = config.refresh_interval().min(Duration::from_secs(1));
    let refresher = conference_central::spawn_refresh_loop(
        app.announcements().clone(),
        interval,
        shutdown_rx,
    );

    tokio::time::sleep(interval * 3).await;
    shutdown_tx.send(true)?;
    refresher.await?;

    match app.announcements().get_announcement().await? {
        Some(announcement) => tracing::info!(%announcement, "Current announcement"),
        None => tracing::info!("No announcement published"),
    }

    Ok(())
}
