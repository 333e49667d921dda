//! Error types for admission control
use std::fmt;
use std::time::Duration;

/// Errors returned by [`RateLimiter`](crate::RateLimiter) and [`Store`](crate::Store) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiting is turned off; the caller should proceed without admission control.
    #[error("rate limiting is disabled")]
    Disabled,
    /// The caller's deadline falls before the time the request could be admitted.
    #[error("waiting {wait:?} would exceed the context deadline")]
    DeadlineWouldBeExceeded {
        /// How long the caller would have had to wait.
        wait: Duration,
    },
    /// The caller's context was canceled while waiting.
    #[error("context canceled while waiting for rate limit")]
    Canceled,
}

impl RateLimitError {
    /// Check if this error only signals that the limiter is turned off.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Check if this error is the early deadline short-circuit.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineWouldBeExceeded { .. })
    }

    /// Check if the caller canceled the wait.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Error produced by [`RateLimitService`](crate::rate_limit::RateLimitService).
#[derive(Debug, Clone)]
pub enum ServiceError<E> {
    /// Admission was refused; the request was never sent.
    RateLimit(RateLimitError),
    /// The wrapped service failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ServiceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit(e) => write!(f, "request not admitted: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ServiceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RateLimit(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> From<RateLimitError> for ServiceError<E> {
    fn from(e: RateLimitError) -> Self {
        Self::RateLimit(e)
    }
}

impl<E> ServiceError<E> {
    /// Check if admission control refused the request.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(_))
    }

    /// Borrow the admission error if present.
    pub fn as_rate_limit(&self) -> Option<&RateLimitError> {
        match self {
            Self::RateLimit(e) => Some(e),
            _ => None,
        }
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
