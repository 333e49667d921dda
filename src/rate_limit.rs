//! Admission control against server-advertised rate limits.
//!
//! This module provides the building blocks for rate limiting:
//! - [`RateLimiter`]: the facade the request pipeline talks to.
//! - [`Store`]: storage and admission logic, with [`InMemoryStore`] as the default backend.
//! - [`RateLimitLayer`]: Tower middleware that calls the limiter around every request.
//!
//! # Architecture
//!
//! The remote service advertises its limits in response headers, per route and in two tiers:
//! an application tier shared by every method of a route, and one tier per method. Each tier
//! is a [`Limit`] holding one [`Bucket`] per `(limit, window)` pair.
//!
//! - **Before a request**: `reserve` checks the application tier then the method tier, waiting
//!   for a window to reset when a bucket is saturated.
//! - **After a response**: `update` rebuilds any tier whose advertised windows changed, seeding
//!   the new buckets from the server's counts, and arms a retry-after penalty on a 429.
//!
//! Nothing runs in the background: windows reset lazily when they are next touched.

use crate::adaptive::DynamicConfig;
use crate::config::RateLimitConfig;
use crate::context::RequestContext;
use crate::RateLimitError;
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

pub mod bucket;
pub mod headers;
pub mod limit;
pub mod limits;
pub mod middleware;
pub mod store;

pub use bucket::{Bucket, BucketSnapshot};
pub use limit::{Limit, LimitSnapshot, LimitType};
pub use limits::{Limits, RouteSnapshot};
pub use middleware::{Endpoint, RateLimitLayer, RateLimitService};
pub use store::{InMemoryStore, Store, StoreKind};

/// Facade over a [`Store`] with a live enable switch.
///
/// Clones share the same store and settings. Each limiter owns its own state: two limiters
/// never observe each other's routes.
///
/// # Example
/// ```
/// use tierguard::{RateLimitConfig, RateLimiter, RequestContext};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = RateLimiter::new(RateLimitConfig::new(0.99, Duration::from_secs(1)));
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(10));
/// limiter.reserve(&ctx, "euw1", "summoner-v4.getByPUUID").await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: DynamicConfig<RateLimitConfig>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Limiter backed by a fresh [`InMemoryStore`] sharing its settings.
    pub fn new(config: RateLimitConfig) -> Self {
        let config = DynamicConfig::new(config.validated());
        let store = InMemoryStore::with_config(config.clone());
        Self { store: Arc::new(store), config }
    }

    /// Limiter over a custom backend. The store keeps its own scaling settings.
    pub fn with_store<S: Store + 'static>(store: S, config: RateLimitConfig) -> Self {
        Self { store: Arc::new(store), config: DynamicConfig::new(config.validated()) }
    }

    /// Limiter that refuses every call with [`RateLimitError::Disabled`].
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Whether admission control is on.
    pub fn is_enabled(&self) -> bool {
        self.config.get().enabled
    }

    /// Turn admission control on or off; takes effect on the next call.
    pub fn set_enabled(&self, enabled: bool) {
        self.config.update(|cfg| RateLimitConfig { enabled, ..cfg.clone() });
    }

    /// Current settings.
    pub fn config(&self) -> Arc<RateLimitConfig> {
        self.config.get()
    }

    /// Replace the settings. Scaling changes apply to tiers rebuilt afterwards.
    pub fn reconfigure(&self, config: RateLimitConfig) {
        self.config.set(config.validated());
    }

    /// Backend in use.
    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Admit one request for `(route, method_id)`, waiting as needed.
    ///
    /// Call before sending. An error means the request must not be sent.
    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
    ) -> Result<(), RateLimitError> {
        if !self.is_enabled() {
            return Err(RateLimitError::Disabled);
        }
        self.store.reserve(ctx, route, method_id).await
    }

    /// Reconcile with a response's headers.
    ///
    /// Call after every response. On a 429, pass the delay from
    /// [`headers::retry_after`]; otherwise pass [`Duration::ZERO`].
    pub async fn update(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
        headers: &HeaderMap,
        retry_after: Duration,
    ) -> Result<(), RateLimitError> {
        if !self.is_enabled() {
            return Err(RateLimitError::Disabled);
        }
        self.store.update(ctx, route, method_id, headers, retry_after).await
    }

    /// Diagnostic view of a route.
    pub async fn snapshot(&self, route: &str) -> Option<RouteSnapshot> {
        self.store.snapshot(route).await
    }
}
