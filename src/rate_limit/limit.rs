//! One tier of limiting (application or method) for one route.

use super::bucket::{reset_at, Bucket, BucketSnapshot};
use super::headers::{parse_pairs, APP_RATE_LIMIT_TYPE, METHOD_RATE_LIMIT_TYPE};
use crate::context::{wait_until, RequestContext};
use crate::RateLimitError;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Which tier a [`Limit`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// Shared by every method of a route.
    Application,
    /// Specific to one method.
    Method,
}

impl LimitType {
    /// Name used by the `X-Rate-Limit-Type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Application => APP_RATE_LIMIT_TYPE,
            LimitType::Method => METHOD_RATE_LIMIT_TYPE,
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buckets enforced together for one tier, plus a one-shot retry-after penalty.
///
/// The bucket set is immutable in shape: when the server advertises different windows, a new
/// `Limit` is built with [`Limit::from_headers`] and swapped in by the store. Only `tokens` and
/// `next` change in place, under the async lock that [`check_buckets`](Limit::check_buckets)
/// holds for its whole run, sleeps included. That serializes admission for the tier.
#[derive(Debug)]
pub struct Limit {
    kind: LimitType,
    definitions: Vec<(u32, Duration)>,
    buckets: Mutex<Vec<Bucket>>,
    retry_after_nanos: AtomicU64,
}

impl Limit {
    /// A limit with no buckets; it admits everything until headers arrive.
    pub fn new(kind: LimitType) -> Self {
        Self {
            kind,
            definitions: Vec::new(),
            buckets: Mutex::new(Vec::new()),
            retry_after_nanos: AtomicU64::new(0),
        }
    }

    /// Build a limit from a limit header and its paired count header.
    ///
    /// Each bucket starts with the server-reported count as its tokens. A count missing at some
    /// position reads as 0. An empty limit header yields an empty limit.
    pub fn from_headers(
        kind: LimitType,
        limit_header: &str,
        count_header: &str,
        limit_usage_factor: f64,
        interval_overhead: Duration,
    ) -> Self {
        let definitions = parse_pairs(limit_header);
        let counts = parse_pairs(count_header);

        let buckets = definitions
            .iter()
            .enumerate()
            .map(|(i, &(base_limit, interval))| {
                let tokens = counts.get(i).map(|&(count, _)| count).unwrap_or(0);
                let limit = scaled_limit(base_limit, limit_usage_factor);
                Bucket::new(interval, interval_overhead, base_limit, limit, tokens)
            })
            .collect();

        Self {
            kind,
            definitions,
            buckets: Mutex::new(buckets),
            retry_after_nanos: AtomicU64::new(0),
        }
    }

    /// Tier this limit enforces.
    pub fn kind(&self) -> LimitType {
        self.kind
    }

    /// `(base_limit, interval)` pairs the buckets were built from, in header order.
    pub fn definitions(&self) -> &[(u32, Duration)] {
        &self.definitions
    }

    /// Pending retry-after penalty, zero when none.
    pub fn retry_after(&self) -> Duration {
        Duration::from_nanos(self.retry_after_nanos.load(Ordering::Acquire))
    }

    /// Arm the retry-after penalty for the next admission check.
    pub fn set_retry_after(&self, delay: Duration) {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.retry_after_nanos.store(nanos, Ordering::Release);
    }

    /// Whether `limit_header` describes exactly the windows this limit already enforces.
    ///
    /// An empty header carries no information and never matches.
    pub fn limits_match(&self, limit_header: &str) -> bool {
        if limit_header.trim().is_empty() {
            return false;
        }
        parse_pairs(limit_header) == self.definitions
    }

    /// Admit one request against every bucket, waiting as needed.
    ///
    /// Drains a pending retry-after first. Buckets are then checked from the last declared to
    /// the first; a saturated bucket makes the caller wait for its reset. Fails only when a
    /// wait would outlast the context deadline or the context is canceled.
    pub async fn check_buckets(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
    ) -> Result<(), RateLimitError> {
        let mut buckets = self.buckets.lock().await;

        let retry_after = self.retry_after_nanos.load(Ordering::Acquire);
        if retry_after > 0 {
            let resume_at = reset_at(Instant::now(), Duration::from_nanos(retry_after));
            if let Err(err) = wait_until(ctx, resume_at).await {
                warn!(
                    target: "tierguard::rate_limit",
                    route,
                    method_id,
                    limit_type = %self.kind,
                    error = %err,
                    "failed to wait for retry after"
                );
                return Err(err);
            }
            // A penalty re-armed during the wait is kept for the next caller.
            let _ = self.retry_after_nanos.compare_exchange(
                retry_after,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        for bucket in buckets.iter_mut().rev() {
            if !bucket.is_rate_limited() {
                continue;
            }

            warn!(
                target: "tierguard::rate_limit",
                route,
                method_id,
                limit_type = %self.kind,
                bucket = ?bucket.snapshot(),
                "rate limited"
            );

            if let Err(err) = wait_until(ctx, bucket.next).await {
                warn!(
                    target: "tierguard::rate_limit",
                    route,
                    method_id,
                    limit_type = %self.kind,
                    error = %err,
                    "failed to wait for reset"
                );
                return Err(err);
            }

            bucket.check();
            bucket.tokens = bucket.tokens.saturating_add(1);
        }

        Ok(())
    }

    /// Diagnostic view of the tier. Waits for any admission check in progress.
    pub async fn snapshot(&self) -> LimitSnapshot {
        let buckets = self.buckets.lock().await;
        LimitSnapshot {
            kind: self.kind,
            retry_after: self.retry_after(),
            buckets: buckets.iter().map(Bucket::snapshot).collect(),
        }
    }
}

/// `floor(base_limit * factor)`, at least 1 when the server advertised a limit.
fn scaled_limit(base_limit: u32, limit_usage_factor: f64) -> u32 {
    if base_limit == 0 {
        return 0;
    }
    let scaled = (f64::from(base_limit) * limit_usage_factor).floor();
    (scaled as u32).max(1)
}

/// Point-in-time copy of a [`Limit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitSnapshot {
    pub kind: LimitType,
    pub retry_after: Duration,
    pub buckets: Vec<BucketSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_waited(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "expected ~{:?}, waited {:?}",
            expected,
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn parses_headers_in_order() {
        let limit = Limit::from_headers(
            LimitType::Application,
            "20:1,100:120",
            "19:1,50:120",
            0.99,
            Duration::from_secs(1),
        );

        let buckets = limit.buckets.lock().await;
        assert_eq!(buckets.len(), 2);
        assert_eq!(
            (buckets[0].base_limit, buckets[0].interval, buckets[0].tokens),
            (20, Duration::from_secs(1), 19)
        );
        assert_eq!(
            (buckets[1].base_limit, buckets[1].interval, buckets[1].tokens),
            (100, Duration::from_secs(120), 50)
        );
        assert_eq!(buckets[0].limit, 19);
    }

    #[test]
    fn scaling_floors_and_keeps_at_least_one() {
        assert_eq!(scaled_limit(20, 0.5), 10);
        assert_eq!(scaled_limit(20, 0.99), 19);
        assert_eq!(scaled_limit(1, 0.5), 1);
        assert_eq!(scaled_limit(0, 0.99), 0);
        assert_eq!(scaled_limit(7, 1.0), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_headers_build_empty_limit() {
        let limit = Limit::from_headers(LimitType::Method, "", "", 0.99, Duration::from_secs(1));
        assert_eq!(limit.kind(), LimitType::Method);
        assert!(limit.definitions().is_empty());
        assert_eq!(limit.retry_after(), Duration::ZERO);
        assert!(limit.snapshot().await.buckets.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_counts_seed_zero_tokens() {
        let limit =
            Limit::from_headers(LimitType::Method, "10:10,10:20", "3:10", 0.99, Duration::ZERO);
        let snap = limit.snapshot().await;
        assert_eq!(snap.buckets[0].tokens, 3);
        assert_eq!(snap.buckets[1].tokens, 0);
    }

    #[test]
    fn limits_match_compares_pairs_by_position() {
        let limit =
            Limit::from_headers(LimitType::Application, "20:1,100:120", "", 0.99, Duration::ZERO);
        assert!(limit.limits_match("20:1,100:120"));
        assert!(limit.limits_match("20:1, 100:120"));
        assert!(!limit.limits_match("100:120,20:1"));
        assert!(!limit.limits_match("20:1"));
        assert!(!limit.limits_match("20:2,100:120"));
        assert!(!limit.limits_match(""));
        assert!(!Limit::new(LimitType::Application).limits_match("20:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_limit_never_blocks() {
        let limit = Limit::new(LimitType::Application);
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(1));
        for _ in 0..1000 {
            limit.check_buckets(&ctx, "route", "method").await.expect("admitted");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_bucket_waits_for_reset() {
        let limit = Limit::from_headers(
            LimitType::Application,
            "4:1",
            "4:1",
            1.0,
            Duration::from_secs(1),
        );
        let ctx = RequestContext::new();
        let start = Instant::now();

        limit.check_buckets(&ctx, "route", "method").await.expect("admitted after reset");

        assert_waited(start, Duration::from_secs(2));
        assert_eq!(limit.snapshot().await.buckets[0].tokens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_short_circuits() {
        let limit = Limit::from_headers(LimitType::Method, "4:10", "4:10", 1.0, Duration::ZERO);
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let start = Instant::now();

        let err = limit.check_buckets(&ctx, "route", "method").await.unwrap_err();

        assert!(err.is_deadline());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_consumed_once() {
        let limit = Limit::new(LimitType::Application);
        limit.set_retry_after(Duration::from_secs(2));
        let ctx = RequestContext::new();

        let start = Instant::now();
        limit.check_buckets(&ctx, "route", "method").await.expect("first");
        assert_waited(start, Duration::from_secs(2));
        assert_eq!(limit.retry_after(), Duration::ZERO);

        let start = Instant::now();
        limit.check_buckets(&ctx, "route", "method").await.expect("second");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_retry_after_wait_keeps_penalty() {
        let limit = Limit::new(LimitType::Application);
        limit.set_retry_after(Duration::from_secs(5));
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));

        let err = limit.check_buckets(&ctx, "route", "method").await.unwrap_err();

        assert!(err.is_deadline());
        assert_eq!(limit.retry_after(), Duration::from_secs(5));
    }

    #[test]
    fn limit_type_names_match_header_values() {
        assert_eq!(LimitType::Application.to_string(), "application");
        assert_eq!(LimitType::Method.as_str(), "method");
    }
}
