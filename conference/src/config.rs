//! Configuration management for Conference Central.
//!
//! Loads configuration from environment variables with sensible defaults.

use conference_central_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Transaction retry configuration
    pub transactions: TransactionConfig,
    /// Announcement refresher configuration
    pub announcement: AnnouncementConfig,
    /// Log filter directive
    pub log_level: String,
}

/// Transaction retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Retries after the first attempt before giving up
    pub max_retries: usize,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
}

/// Announcement refresher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementConfig {
    /// Conferences with fewer seats than this (but more than zero) are announced
    pub low_seats_threshold: u32,
    /// Cache key the announcement is stored under
    pub cache_key: String,
    /// Seconds between refreshes
    pub refresh_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transactions: TransactionConfig {
                max_retries: 5,
                initial_delay_ms: 10,
                max_delay_ms: 500,
            },
            announcement: AnnouncementConfig {
                low_seats_threshold: 5,
                cache_key: "RECENT_ANNOUNCEMENTS".to_string(),
                refresh_interval_secs: 60,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`Config::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transactions: TransactionConfig {
                max_retries: env::var("CONFERENCE_TX_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.transactions.max_retries),
                initial_delay_ms: env::var("CONFERENCE_TX_INITIAL_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.transactions.initial_delay_ms),
                max_delay_ms: env::var("CONFERENCE_TX_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.transactions.max_delay_ms),
            },
            announcement: AnnouncementConfig {
                low_seats_threshold: env::var("ANNOUNCEMENT_LOW_SEATS_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.announcement.low_seats_threshold),
                cache_key: env::var("ANNOUNCEMENT_CACHE_KEY")
                    .unwrap_or(defaults.announcement.cache_key),
                refresh_interval_secs: parse_interval_secs(
                    env::var("ANNOUNCEMENT_REFRESH_INTERVAL_SECS").ok().as_deref(),
                    defaults.announcement.refresh_interval_secs,
                ),
            },
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Retry policy for store transactions and cache writes
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.transactions.max_retries)
            .initial_delay(Duration::from_millis(self.transactions.initial_delay_ms))
            .max_delay(Duration::from_millis(self.transactions.max_delay_ms))
            .build()
    }

    /// Interval between announcement refreshes
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.announcement.refresh_interval_secs)
    }
}

/// Parse a refresh interval in seconds. Zero and garbage fall back to `default`.
fn parse_interval_secs(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse().ok())
        .filter(|&secs| secs > 0)
        .unwrap_or(default)
}
