//! Announcement refresher.
//!
//! Scans every conference, picks those that are nearly sold out and overwrites
//! one cached summary string. The refresh never reads the previous value, so
//! it can run concurrently with itself: the last writer wins and every writer
//! computes the same text from the same data.
//!
//! The scan reads outside any transaction and may see in-flight seat counts.
//! The announcement is never used for capacity decisions.

use super::profiles::decode_all;
use crate::config::AnnouncementConfig;
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::types::Conference;
use conference_central_core::cache::Cache;
use conference_central_core::store::{Entity, EntityStore};
use conference_central_runtime::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shortest period the refresh loop will tick at.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

const ANNOUNCEMENT_PREFIX: &str =
    "Last chance to attend! The following conferences are nearly sold out: ";

/// What a refresh did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The announcement was written to the cache
    Published {
        /// Text written
        announcement: String,
        /// Number of conferences named
        conferences: usize,
    },
    /// Nothing qualified; the cache was left untouched
    Skipped,
}

/// Build the announcement for the conferences with `0 < seats < threshold`.
///
/// Returns `None` when no conference qualifies.
#[must_use]
pub fn compose_announcement(conferences: &[Conference], threshold: u32) -> Option<(String, usize)> {
    let names: Vec<&str> = conferences
        .iter()
        .filter(|c| c.seats_available() > 0 && c.seats_available() < threshold)
        .map(|c| c.name.as_str())
        .collect();
    if names.is_empty() {
        return None;
    }
    Some((format!("{ANNOUNCEMENT_PREFIX}{}", names.join(", ")), names.len()))
}

/// Recomputes and publishes the "nearly sold out" announcement.
#[derive(Clone)]
pub struct AnnouncementRefresher {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn Cache>,
    cache_key: String,
    threshold: u32,
    policy: RetryPolicy,
}

impl AnnouncementRefresher {
    /// Create a refresher
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn Cache>,
        config: &AnnouncementConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            cache_key: config.cache_key.clone(),
            threshold: config.low_seats_threshold,
            policy,
        }
    }

    /// Recompute the announcement and overwrite the cached value.
    ///
    /// # Errors
    ///
    /// - `Store`: the conference scan failed
    /// - `Cache`: the cache stayed unavailable through every retry
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let records = self.store.load_kind(Conference::KIND).await?;
        let conferences: Vec<Conference> = decode_all(&records)?;

        let Some((announcement, count)) = compose_announcement(&conferences, self.threshold) else {
            metrics::record_announcement_refresh("skipped", 0);
            tracing::debug!(scanned = conferences.len(), "No conference nearly sold out");
            return Ok(RefreshOutcome::Skipped);
        };

        let published = retry_with_backoff(&self.policy, || {
            self.cache.put(&self.cache_key, announcement.clone())
        })
        .await;
        if let Err(err) = published {
            metrics::record_announcement_refresh("failed", count);
            tracing::error!(key = %self.cache_key, error = %err, "Announcement not published");
            return Err(ServiceError::Cache(err));
        }

        metrics::record_announcement_refresh("published", count);
        tracing::info!(key = %self.cache_key, conferences = count, "Announcement published");
        Ok(RefreshOutcome::Published {
            announcement,
            conferences: count,
        })
    }

    /// Read the current announcement from the cache.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the cache is unavailable.
    pub async fn get_announcement(&self) -> Result<Option<String>> {
        Ok(self.cache.get(&self.cache_key).await?)
    }
}

/// Run `refresher` every `interval` until `shutdown` turns `true`.
///
/// The first refresh runs immediately. A failed refresh is logged and the loop
/// carries on. Intervals below [`MIN_REFRESH_INTERVAL`] are raised to it.
#[must_use]
pub fn spawn_refresh_loop(
    refresher: AnnouncementRefresher,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    if interval < MIN_REFRESH_INTERVAL {
        tracing::warn!(
            requested_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Refresh interval too short, using minimum"
        );
    }
    let interval = interval.max(MIN_REFRESH_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Announcement refresher started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = refresher.refresh().await {
                        tracing::error!(error = %err, "Announcement refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Announcement refresher stopped");
    })
}
