//! A single fixed-window token counter.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Counter for one `(limit, interval)` window advertised by the server.
///
/// Window resets are lazy: nothing ticks in the background, every access calls
/// [`check`](Bucket::check) first. Not synchronized; the owning [`Limit`](super::Limit) holds
/// its lock around every access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Requests admitted in the current window.
    pub tokens: u32,
    /// Raw limit reported by the server; 0 means unknown.
    pub base_limit: u32,
    /// Enforced limit, `base_limit` scaled by the usage factor.
    pub limit: u32,
    /// Window length reported by the server.
    pub interval: Duration,
    /// Padding added to every window.
    pub interval_overhead: Duration,
    /// When the current window resets.
    pub next: Instant,
}

impl Bucket {
    /// Bucket whose first window starts now.
    pub fn new(
        interval: Duration,
        interval_overhead: Duration,
        base_limit: u32,
        limit: u32,
        tokens: u32,
    ) -> Self {
        Self {
            tokens,
            base_limit,
            limit,
            interval,
            interval_overhead,
            next: reset_at(Instant::now(), interval.saturating_add(interval_overhead)),
        }
    }

    /// Reset the window if it has lapsed.
    pub fn check(&mut self) {
        let now = Instant::now();
        if self.next <= now {
            self.tokens = 0;
            self.next = reset_at(now, self.interval.saturating_add(self.interval_overhead));
        }
    }

    /// Try to admit one request; returns `true` when the window is saturated.
    ///
    /// Up to `limit` requests are admitted per window: the count is compared before it is
    /// incremented, so the request that would make `tokens` exceed `limit` is the first refused.
    /// An admitted request consumes a token. A saturated bucket is left untouched so the caller
    /// can wait for [`next`](Bucket::next). A bucket with no known limit never saturates.
    pub fn is_rate_limited(&mut self) -> bool {
        self.check();
        if self.limit == 0 {
            return false;
        }
        if self.tokens >= self.limit {
            return true;
        }
        self.tokens += 1;
        false
    }

    /// Diagnostic view of the bucket.
    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            tokens: self.tokens,
            base_limit: self.base_limit,
            limit: self.limit,
            interval: self.interval,
            interval_overhead: self.interval_overhead,
            resets_in: self.next.saturating_duration_since(Instant::now()),
        }
    }
}

/// Roughly 30 years; stands in for an interval too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + window`, saturating to a far-future instant instead of overflowing.
pub(crate) fn reset_at(now: Instant, window: Duration) -> Instant {
    now.checked_add(window)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Point-in-time copy of a [`Bucket`], suitable for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSnapshot {
    pub tokens: u32,
    pub base_limit: u32,
    pub limit: u32,
    pub interval: Duration,
    pub interval_overhead: Duration,
    pub resets_in: Duration,
}
