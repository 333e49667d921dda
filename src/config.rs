//! Rate limiter configuration.
//!
//! [`RateLimitConfig`] is plain data and deserializes with serde; loading it from a file or the
//! environment is left to the embedding application. Out-of-range values are never rejected,
//! they are clamped to the defaults by [`RateLimitConfig::validated`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fraction of the advertised limit used when the configured factor is out of range.
pub const DEFAULT_LIMIT_USAGE_FACTOR: f64 = 0.99;

/// Window padding used when the configured overhead is negative.
pub const DEFAULT_INTERVAL_OVERHEAD: Duration = Duration::from_secs(1);

/// Settings shared by the [`RateLimiter`](crate::RateLimiter) facade and its store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// When false, `reserve`/`update` return [`RateLimitError::Disabled`](crate::RateLimitError).
    pub enabled: bool,
    /// Fraction of each advertised limit the client allows itself, in `(0, 1]`.
    pub limit_usage_factor: f64,
    /// Extra milliseconds added to every window to absorb clock skew and latency.
    pub interval_overhead_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit_usage_factor: DEFAULT_LIMIT_USAGE_FACTOR,
            interval_overhead_ms: DEFAULT_INTERVAL_OVERHEAD.as_millis() as i64,
        }
    }
}

impl RateLimitConfig {
    /// Enabled config with the given factor and overhead, clamped into range.
    pub fn new(limit_usage_factor: f64, interval_overhead: Duration) -> Self {
        Self {
            enabled: true,
            limit_usage_factor,
            interval_overhead_ms: i64::try_from(interval_overhead.as_millis()).unwrap_or(i64::MAX),
        }
        .validated()
    }

    /// Config with admission control turned off.
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Replace out-of-range values with the defaults.
    ///
    /// A factor outside `(0, 1]` (NaN included) becomes 0.99; a negative overhead becomes 1s.
    pub fn validated(mut self) -> Self {
        if !(self.limit_usage_factor > 0.0 && self.limit_usage_factor <= 1.0) {
            self.limit_usage_factor = DEFAULT_LIMIT_USAGE_FACTOR;
        }
        if self.interval_overhead_ms < 0 {
            self.interval_overhead_ms = DEFAULT_INTERVAL_OVERHEAD.as_millis() as i64;
        }
        self
    }

    /// Window padding as a duration; negative values read as the default.
    pub fn interval_overhead(&self) -> Duration {
        u64::try_from(self.interval_overhead_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_INTERVAL_OVERHEAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RateLimitConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.limit_usage_factor, 0.99);
        assert_eq!(cfg.interval_overhead(), Duration::from_secs(1));
    }

    #[test]
    fn invalid_values_are_clamped() {
        let cfg = RateLimitConfig {
            enabled: true,
            limit_usage_factor: -1.0,
            interval_overhead_ms: -1,
        }
        .validated();
        assert_eq!(cfg.limit_usage_factor, DEFAULT_LIMIT_USAGE_FACTOR);
        assert_eq!(cfg.interval_overhead(), DEFAULT_INTERVAL_OVERHEAD);

        for factor in [0.0, 1.5, f64::NAN] {
            let cfg =
                RateLimitConfig { limit_usage_factor: factor, ..Default::default() }.validated();
            assert_eq!(cfg.limit_usage_factor, DEFAULT_LIMIT_USAGE_FACTOR, "factor {factor}");
        }
    }

    #[test]
    fn valid_values_are_kept() {
        let cfg = RateLimitConfig::new(0.5, Duration::from_millis(250));
        assert_eq!(cfg.limit_usage_factor, 0.5);
        assert_eq!(cfg.interval_overhead(), Duration::from_millis(250));

        let cfg = RateLimitConfig::new(1.0, Duration::ZERO);
        assert_eq!(cfg.limit_usage_factor, 1.0);
        assert_eq!(cfg.interval_overhead(), Duration::ZERO);
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: RateLimitConfig =
            serde_json::from_str(r#"{"limit_usage_factor": 0.8}"#).expect("valid json");
        assert!(cfg.enabled);
        assert_eq!(cfg.limit_usage_factor, 0.8);
        assert_eq!(cfg.interval_overhead_ms, 1000);

        let cfg: RateLimitConfig =
            serde_json::from_str(r#"{"enabled": false, "interval_overhead_ms": -5}"#)
                .expect("valid json");
        assert!(!cfg.enabled);
        assert_eq!(cfg.validated().interval_overhead_ms, 1000);
    }
}
