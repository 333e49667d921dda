use crate::context::RequestContext;
use crate::rate_limit::headers::retry_after;
use crate::rate_limit::RateLimiter;
use crate::{RateLimitError, ServiceError};
use futures::future::BoxFuture;
use http::{Request, Response, StatusCode};
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;
use tracing::warn;

/// Route and method a request is limited under.
///
/// Insert it into the request extensions. Without one, the URI authority is used as the route
/// and the path as the method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Upstream grouping sharing one application tier, e.g. a regional host.
    pub route: String,
    /// Operation within the route, with its own method tier.
    pub method_id: String,
}

impl Endpoint {
    pub fn new(route: impl Into<String>, method_id: impl Into<String>) -> Self {
        Self { route: route.into(), method_id: method_id.into() }
    }

    fn of<B>(req: &Request<B>) -> Self {
        if let Some(endpoint) = req.extensions().get::<Endpoint>() {
            return endpoint.clone();
        }
        Self {
            route: req.uri().authority().map(|a| a.to_string()).unwrap_or_default(),
            method_id: req.uri().path().to_string(),
        }
    }
}

/// A layer that runs every request through a [`RateLimiter`].
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    /// Create a new rate limit layer.
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Middleware service: `reserve` before the inner call, `update` after it.
///
/// A [`RequestContext`] found in the request extensions bounds the wait; otherwise the request
/// may wait indefinitely. Responses are returned unchanged, 429s included: retrying is the
/// caller's decision. A disabled limiter lets every request through.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S, B, R> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    type Response = Response<R>;
    type Error = ServiceError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ServiceError::Inner)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let endpoint = Endpoint::of(&req);
            let ctx = req.extensions().get::<RequestContext>().cloned().unwrap_or_default();

            match limiter.reserve(&ctx, &endpoint.route, &endpoint.method_id).await {
                Ok(()) | Err(RateLimitError::Disabled) => {}
                Err(e) => return Err(ServiceError::RateLimit(e)),
            }

            let response = inner.call(req).await.map_err(ServiceError::Inner)?;

            let delay = if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let delay = retry_after(response.headers());
                warn!(
                    target: "tierguard::rate_limit",
                    route = %endpoint.route,
                    method_id = %endpoint.method_id,
                    ?delay,
                    "too many requests"
                );
                delay
            } else {
                Duration::ZERO
            };

            let updated = limiter
                .update(&ctx, &endpoint.route, &endpoint.method_id, response.headers(), delay)
                .await;
            match updated {
                Ok(()) | Err(RateLimitError::Disabled) => {}
                Err(e) => warn!(
                    target: "tierguard::rate_limit",
                    route = %endpoint.route,
                    method_id = %endpoint.method_id,
                    error = %e,
                    "failed to update rate limits"
                ),
            }

            Ok(response)
        })
    }
}
