use async_trait::async_trait;
use http::HeaderMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::headers::{
    header_str, rate_limit_type, APP_RATE_LIMIT_COUNT_HEADER, APP_RATE_LIMIT_HEADER,
    APP_RATE_LIMIT_TYPE, METHOD_RATE_LIMIT_COUNT_HEADER, METHOD_RATE_LIMIT_HEADER,
};
use super::limit::{Limit, LimitType};
use super::limits::{Limits, RouteSnapshot};
use crate::adaptive::DynamicConfig;
use crate::config::RateLimitConfig;
use crate::context::RequestContext;
use crate::RateLimitError;

/// Which backend a [`Store`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreKind {
    /// Process-local, [`InMemoryStore`].
    Internal,
}

/// Storage and admission interface for per-route, per-method limits.
///
/// The seam for alternative backends (e.g., a counter shared between processes); callers only
/// ever see this trait through [`RateLimiter`](crate::RateLimiter).
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Admit one request for `(route, method_id)`, waiting as needed.
    async fn reserve(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
    ) -> Result<(), RateLimitError>;

    /// Reconcile with the limits and counts reported in response `headers`.
    ///
    /// `retry_after` is armed on the tier named by `X-Rate-Limit-Type`, when present.
    async fn update(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
        headers: &HeaderMap,
        retry_after: Duration,
    ) -> Result<(), RateLimitError>;

    /// Backend identifier for diagnostics.
    fn kind(&self) -> StoreKind;

    /// Diagnostic view of a route, `None` if it was never seen.
    async fn snapshot(&self, route: &str) -> Option<RouteSnapshot>;
}

/// Process-local store: route → [`Limits`], created lazily and kept for the store's lifetime.
///
/// The route map lock is held only to fetch or create an entry. Admission then synchronizes on
/// the individual tier, so unrelated routes and methods never contend.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    routes: Arc<Mutex<HashMap<String, Arc<Limits>>>>,
    config: DynamicConfig<RateLimitConfig>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl InMemoryStore {
    /// Store with fixed settings.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_config(DynamicConfig::new(config.validated()))
    }

    /// Store reading usage factor and interval overhead from a live handle.
    ///
    /// New values apply to tiers rebuilt after the change. Values are clamped on every read, so
    /// an out-of-range setting written through the handle falls back to the defaults.
    pub fn with_config(config: DynamicConfig<RateLimitConfig>) -> Self {
        Self { routes: Arc::new(Mutex::new(HashMap::new())), config }
    }

    fn limits(&self, route: &str) -> Arc<Limits> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.entry(route.to_string()).or_default().clone()
    }

    fn find(&self, route: &str) -> Option<Arc<Limits>> {
        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.get(route).cloned()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn reserve(
        &self,
        ctx: &RequestContext,
        route: &str,
        method_id: &str,
    ) -> Result<(), RateLimitError> {
        let limits = self.limits(route);
        let method = limits.method(method_id);

        limits.app().check_buckets(ctx, route, method_id).await?;
        method.check_buckets(ctx, route, method_id).await
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        route: &str,
        method_id: &str,
        headers: &HeaderMap,
        retry_after: Duration,
    ) -> Result<(), RateLimitError> {
        let limits = self.limits(route);

        if let Some(limit_type) = rate_limit_type(headers) {
            if limit_type == APP_RATE_LIMIT_TYPE {
                limits.app().set_retry_after(retry_after);
            } else {
                limits.method(method_id).set_retry_after(retry_after);
            }
            debug!(
                target: "tierguard::rate_limit",
                route,
                method_id,
                limit_type,
                ?retry_after,
                "retry after armed"
            );
        }

        let config = self.config.get().as_ref().clone().validated();
        let factor = config.limit_usage_factor;
        let overhead = config.interval_overhead();

        let app_header = header_str(headers, APP_RATE_LIMIT_HEADER);
        if !app_header.is_empty() && !limits.app().limits_match(app_header) {
            let count_header = header_str(headers, APP_RATE_LIMIT_COUNT_HEADER);
            let limit = Limit::from_headers(
                LimitType::Application,
                app_header,
                count_header,
                factor,
                overhead,
            );
            debug!(
                target: "tierguard::rate_limit",
                route,
                limit = app_header,
                count = count_header,
                "new application limit"
            );
            limits.replace_app(limit);
        }

        let method_header = header_str(headers, METHOD_RATE_LIMIT_HEADER);
        if !method_header.is_empty() && !limits.method(method_id).limits_match(method_header) {
            let count_header = header_str(headers, METHOD_RATE_LIMIT_COUNT_HEADER);
            let limit = Limit::from_headers(
                LimitType::Method,
                method_header,
                count_header,
                factor,
                overhead,
            );
            debug!(
                target: "tierguard::rate_limit",
                route,
                method_id,
                limit = method_header,
                count = count_header,
                "new method limit"
            );
            limits.replace_method(method_id, limit);
        }

        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Internal
    }

    async fn snapshot(&self, route: &str) -> Option<RouteSnapshot> {
        let limits = self.find(route)?;
        Some(limits.snapshot().await)
    }
}
