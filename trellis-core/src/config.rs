//! Cache configuration and time source.
//!
//! Expiry timestamps are epoch milliseconds. The cache asks its [`Clock`] for
//! the current time whenever it decides staleness, so hosts (and tests) can
//! substitute a deterministic clock.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Tunables for a [`Cache`](crate::Cache).
///
/// Deserializable so hosts can load it alongside their own settings:
///
/// ```rust
/// use trellis_core::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(r#"{ "default_ttl_ms": 30000 }"#).unwrap();
/// assert_eq!(config.default_ttl_ms, Some(30_000));
/// assert!(!config.auto_gc);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live applied to writes that carry no explicit expiry.
    /// `None` means such writes never expire.
    pub default_ttl_ms: Option<u64>,

    /// Run a garbage collection pass after every notification flush.
    pub auto_gc: bool,
}

/// Source of the current time.
pub trait Clock {
    /// Current time in epoch milliseconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManualClock").field(&self.now()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        other.advance(500);
        assert_eq!(clock.now(), 1_500);

        clock.set(10);
        assert_eq!(other.now(), 10);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800_000);
    }

    #[test]
    fn config_defaults_when_fields_absent() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
    }
}
