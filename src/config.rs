use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::poller::PollSettings;
use crate::state::DiffPolicy;

/// Central configuration loaded from environment variables.
///
/// Every value has a default, so a bare `watchpost init` works with no
/// environment at all. The .env file is loaded automatically at startup
/// via dotenvy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: String,
    /// Queued notifications before pollers block (WATCHPOST_NOTIFY_BUFFER).
    pub notify_buffer: usize,
    /// How long repeated copies of one item collapse into replies.
    pub compact_window: Duration,
    pub poll_interval: Duration,
    /// Per-fetch timeout; a slower fetch abandons that target's cycle.
    pub poll_timeout: Duration,
    pub poll_concurrency: usize,
    /// How long a fetch result (or failure) is shared between polls.
    pub fetch_cooldown: Duration,
    pub cache_capacity: usize,
    /// Site-wide default for "stream ended" notifications.
    pub notify_offline: bool,
    pub snapshot_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./watchpost.db".to_string(),
            notify_buffer: 256,
            compact_window: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(60),
            poll_timeout: Duration::from_secs(30),
            poll_concurrency: 8,
            fetch_cooldown: Duration::from_secs(10),
            cache_capacity: 1024,
            notify_offline: false,
            snapshot_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables take their defaults; set but unparseable ones are
    /// an error naming the variable.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            db_path: env::var("WATCHPOST_DB_PATH").unwrap_or(defaults.db_path),
            notify_buffer: parse_var("WATCHPOST_NOTIFY_BUFFER", defaults.notify_buffer)?,
            compact_window: secs_var("WATCHPOST_COMPACT_WINDOW_SECS", defaults.compact_window)?,
            poll_interval: secs_var("WATCHPOST_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            poll_timeout: secs_var("WATCHPOST_POLL_TIMEOUT_SECS", defaults.poll_timeout)?,
            poll_concurrency: parse_var("WATCHPOST_POLL_CONCURRENCY", defaults.poll_concurrency)?,
            fetch_cooldown: secs_var("WATCHPOST_FETCH_COOLDOWN_SECS", defaults.fetch_cooldown)?,
            cache_capacity: parse_var("WATCHPOST_CACHE_CAPACITY", defaults.cache_capacity)?,
            notify_offline: parse_var("WATCHPOST_NOTIFY_OFFLINE", defaults.notify_offline)?,
            snapshot_ttl: days_var("WATCHPOST_SNAPSHOT_TTL_DAYS", defaults.snapshot_ttl)?,
        })
    }

    pub fn diff_policy(&self) -> DiffPolicy {
        DiffPolicy {
            notify_offline: self.notify_offline,
            snapshot_ttl: self.snapshot_ttl,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            timeout: self.poll_timeout,
            concurrency: self.poll_concurrency,
            fetch_cooldown: self.fetch_cooldown,
            cache_capacity: self.cache_capacity,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

fn days_var(name: &str, default: Duration) -> Result<Duration> {
    const SECS_PER_DAY: u64 = 86_400;
    let days = parse_var(name, default.as_secs() / SECS_PER_DAY)?;
    days.checked_mul(SECS_PER_DAY)
        .map(Duration::from_secs)
        .with_context(|| format!("{name} is too large: {days} days"))
}
