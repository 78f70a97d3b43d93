//! Engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Items per page when a caller does not choose.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Buffered items per source at or below which the next page is prefetched.
pub const DEFAULT_LOW_WATER_MARK: usize = 50;

/// Tunables for [`crate::FeedEngine`].
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Account identity handed to the fetch de-duplication guard.
    pub account: String,

    /// Default page size for feeds created by the front end.
    pub page_size: usize,

    /// Prefetch threshold per source.
    pub low_water_mark: usize,

    /// Upstream signals within this window collapse into one recompute.
    pub coalesce_window: Duration,

    /// First retry delay after a failed fetch; doubles up to `retry_max`.
    pub retry_base: Duration,

    pub retry_max: Duration,

    /// Pages kept by the persistent page store.
    pub store_capacity: usize,

    /// Sorted pools memoized across feeds.
    pub pool_memo_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            account: "anonymous".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            coalesce_window: Duration::from_millis(100),
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(60),
            store_capacity: 500,
            pool_memo_capacity: 32,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LIVESCROLL_ACCOUNT` (default: anonymous)
    /// - `LIVESCROLL_PAGE_SIZE` (default: 25)
    /// - `LIVESCROLL_LOW_WATER_MARK` (default: 50)
    /// - `LIVESCROLL_COALESCE_MS` (default: 100)
    /// - `LIVESCROLL_RETRY_BASE_MS` (default: 1000)
    /// - `LIVESCROLL_RETRY_MAX_MS` (default: 60000)
    /// - `LIVESCROLL_STORE_CAPACITY` (default: 500)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable lookup, so the
    /// parsing can be tested without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |name: &str, fallback: Duration| {
            parsed(name).map(Duration::from_millis).unwrap_or(fallback)
        };

        Self {
            account: lookup("LIVESCROLL_ACCOUNT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.account),
            page_size: positive(lookup("LIVESCROLL_PAGE_SIZE")).unwrap_or(defaults.page_size),
            low_water_mark: lookup("LIVESCROLL_LOW_WATER_MARK")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.low_water_mark),
            coalesce_window: millis("LIVESCROLL_COALESCE_MS", defaults.coalesce_window),
            retry_base: millis("LIVESCROLL_RETRY_BASE_MS", defaults.retry_base),
            retry_max: millis("LIVESCROLL_RETRY_MAX_MS", defaults.retry_max),
            store_capacity: positive(lookup("LIVESCROLL_STORE_CAPACITY"))
                .unwrap_or(defaults.store_capacity),
            pool_memo_capacity: defaults.pool_memo_capacity,
        }
    }

    /// Delay before retry number `attempt` (starting at 1).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

fn positive<T: FromStr + PartialOrd + Default>(value: Option<String>) -> Option<T> {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}
