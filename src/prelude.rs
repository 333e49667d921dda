//! Convenient re-exports for common tierguard types.
pub use crate::{
    config::{RateLimitConfig, DEFAULT_INTERVAL_OVERHEAD, DEFAULT_LIMIT_USAGE_FACTOR},
    context::RequestContext,
    error::{RateLimitError, ServiceError},
    rate_limit::{
        headers::{retry_after, DEFAULT_RETRY_AFTER},
        Endpoint, InMemoryStore, RateLimitLayer, RateLimiter, Store,
    },
};
