//! Business metrics for Conference Central.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `conference_registrations_total{operation, outcome}` - Registration attempts by result
//! - `conference_sessions_created_total` - Sessions committed
//! - `conference_speaker_links_total{status}` - Speaker link transactions by result
//! - `conference_announcement_refreshes_total{status}` - Announcement refreshes by result
//!
//! ## Gauges
//! - `conference_announced_conferences` - Conferences named in the last announcement

use metrics::{describe_counter, describe_gauge};

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_metrics() {
    describe_counter!(
        "conference_registrations_total",
        "Registration attempts by operation (register, unregister) and outcome"
    );
    describe_counter!(
        "conference_sessions_created_total",
        "Total number of sessions committed"
    );
    describe_counter!(
        "conference_speaker_links_total",
        "Speaker link transactions by status (linked, unchanged, failed)"
    );
    describe_counter!(
        "conference_announcement_refreshes_total",
        "Announcement refreshes by status (published, skipped, failed)"
    );
    describe_gauge!(
        "conference_announced_conferences",
        "Number of conferences named in the most recent announcement"
    );

    tracing::info!("Conference metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a registration attempt.
///
/// * `operation` - `register` or `unregister`
/// * `outcome` - `success`, `not_found`, or a conflict reason code
pub fn record_registration(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "conference_registrations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a committed session.
pub fn record_session_created() {
    metrics::counter!("conference_sessions_created_total").increment(1);
}

/// Record a speaker link transaction (`linked`, `unchanged`, `failed`).
pub fn record_speaker_link(status: &'static str) {
    metrics::counter!("conference_speaker_links_total", "status" => status).increment(1);
}

/// Record an announcement refresh (`published`, `skipped`, `failed`).
#[allow(clippy::cast_precision_loss)]
pub fn record_announcement_refresh(status: &'static str, announced: usize) {
    metrics::counter!("conference_announcement_refreshes_total", "status" => status).increment(1);
    if status == "published" {
        metrics::gauge!("conference_announced_conferences").set(announced as f64);
    }
}
