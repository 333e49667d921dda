#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tierguard
//!
//! Client-side admission control for APIs that advertise multi-tier rate limits in their
//! response headers.
//!
//! ## Features
//!
//! - **Two tiers** per route: an application limit shared by every method, and one limit per method
//! - **Multiple windows** per tier (`20:1,100:120` means 20 per second *and* 100 per two minutes)
//! - **Self-correcting** counters seeded from the server's own counts on every limit change
//! - **429 recovery**: `Retry-After` is honored once before the next admission on that tier
//! - **Deadline aware** waits that fail fast instead of sleeping past the caller's deadline
//! - **Tower middleware** for wrapping an HTTP client
//!
//! ## Quick Start
//!
//! ```rust
//! use tierguard::{RateLimiter, RateLimitConfig, RequestContext};
//! use tierguard::rate_limit::headers;
//! use http::HeaderMap;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = RateLimiter::new(RateLimitConfig::default());
//!     let ctx = RequestContext::new().with_timeout(Duration::from_secs(30));
//!
//!     limiter.reserve(&ctx, "euw1", "match-v5.getMatch").await.unwrap();
//!     // ... send the request, then feed the response headers back:
//!     let response_headers = HeaderMap::new();
//!     let status = 200;
//!     let delay =
//!         if status == 429 { headers::retry_after(&response_headers) } else { Duration::ZERO };
//!     limiter
//!         .update(&ctx, "euw1", "match-v5.getMatch", &response_headers, delay)
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod adaptive;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod rate_limit;

// Re-exports
pub use adaptive::DynamicConfig;
pub use config::RateLimitConfig;
pub use context::{wait_until, RequestContext};
pub use error::{RateLimitError, ServiceError};
pub use rate_limit::{
    Endpoint, InMemoryStore, Limit, LimitType, RateLimitLayer, RateLimitService, RateLimiter,
    Store, StoreKind,
};
