//! Per-request cancellation and deadline carried into every admission check.
//!
//! A [`RequestContext`] pairs a [`CancellationToken`] with an optional deadline. Waits performed
//! on behalf of a request check the deadline *before* sleeping, so a caller never pays for a wait
//! that would end after its deadline anyway.

use crate::RateLimitError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline for one outbound request.
///
/// Clones share the same token: canceling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Context with no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self { deadline: None, cancel: CancellationToken::new() }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now. A timeout too large to represent leaves no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Derive a context whose token is canceled when this one is, but can be canceled alone.
    pub fn child(&self) -> Self {
        Self { deadline: self.deadline, cancel: self.cancel.child_token() }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every wait using this context (and its children).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Wait until `resume_at`, honoring the context's deadline and cancellation.
///
/// Returns [`RateLimitError::DeadlineWouldBeExceeded`] immediately, without sleeping, when the
/// deadline falls before `resume_at`. Otherwise sleeps and returns [`RateLimitError::Canceled`]
/// if the token fires first.
pub async fn wait_until(ctx: &RequestContext, resume_at: Instant) -> Result<(), RateLimitError> {
    let wait = resume_at.saturating_duration_since(Instant::now());

    if let Some(deadline) = ctx.deadline {
        if deadline < resume_at {
            return Err(RateLimitError::DeadlineWouldBeExceeded { wait });
        }
    }

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(RateLimitError::Canceled),
        _ = tokio::time::sleep_until(resume_at) => Ok(()),
    }
}
