//! Rate limiting middleware.
//!
//! Two admission strategies share one service:
//!
//! - a rolling window log (the default): at most `limit` calls are admitted
//!   in any window of length `window`, and the first `limit` calls go out at
//!   once;
//! - a `governor` quota: permits are spaced evenly, which suits servers that
//!   dislike bursts.
//!
//! Waiting for a permit is the only place where this middleware suspends.
//! A request whose cancellation token fires while it waits fails with
//! [`Error::Cancelled`] and never reaches the inner service.

use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, trace};

use crate::{Cancel, Error, Request, Response, Result};

/// Type alias for the governor rate limiter.
type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Admission log of the calls let through during the last window.
#[derive(Debug)]
struct RollingWindow {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RollingWindow {
    fn new(limit: NonZeroU32, window: Duration) -> Self {
        let limit = usize::try_from(limit.get()).unwrap_or(usize::MAX);
        Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    /// Wait until a call may be admitted, then record it.
    ///
    /// The lock is held while sleeping: the tokio mutex queues waiters in
    /// order, so permits are handed out first come, first served.
    async fn acquire(&self) {
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|&at| now.duration_since(at) >= self.window)
            {
                admitted.pop_front();
            }

            if admitted.len() < self.limit {
                admitted.push_back(now);
                return;
            }

            let Some(&oldest) = admitted.front() else {
                return;
            };
            match oldest.checked_add(self.window) {
                Some(deadline) => sleep_until(deadline).await,
                // The window outlasts the clock: the oldest permit never
                // expires, so only cancellation ends the wait.
                None => std::future::pending().await,
            }
        }
    }
}

#[derive(Debug)]
enum Gate {
    Rolling(RollingWindow),
    Governor(GovernorLimiter),
}

impl Gate {
    async fn acquire(&self) {
        match self {
            Self::Rolling(window) => window.acquire().await,
            Self::Governor(limiter) => limiter.until_ready().await,
        }
    }
}

fn validate(limit: u32, window: Duration) -> Result<NonZeroU32> {
    let Some(limit) = NonZeroU32::new(limit) else {
        return Err(Error::invalid_config("rate limit must admit at least one call"));
    };
    if window.is_zero() {
        return Err(Error::invalid_config("rate limit window must be longer than zero"));
    }
    Ok(limit)
}

/// Layer that applies rate limiting to requests.
///
/// Every service produced by one layer shares the same limiter, so clones of
/// a pipeline draw from a single budget.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use mediate::middleware::RateLimitLayer;
///
/// // At most 10 calls in any rolling second
/// let layer = RateLimitLayer::new(10, Duration::from_secs(1))?;
///
/// // One call every 100ms
/// let layer = RateLimitLayer::paced(10, Duration::from_secs(1))?;
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    gate: Arc<Gate>,
}

impl RateLimitLayer {
    /// Admit at most `limit` calls in any rolling `window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `limit` is zero or `window` is empty.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        let limit = validate(limit, window)?;
        Ok(Self::from_gate(Gate::Rolling(RollingWindow::new(limit, window))))
    }

    /// Admit `limit` calls per `window`, spaced evenly over the window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `limit` is zero, `window` is empty,
    /// or `window / limit` rounds down to zero or does not fit in `u64`
    /// nanoseconds.
    pub fn paced(limit: u32, window: Duration) -> Result<Self> {
        let limit = validate(limit, window)?;
        let period = window / limit.get();
        if u64::try_from(period.as_nanos()).is_err() {
            return Err(Error::invalid_config("rate limit window is too long to pace"));
        }
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::invalid_config("rate limit window is too short to pace"))?;
        Ok(Self::with_quota(quota))
    }

    /// Create a rate limiter with a custom `governor` quota.
    #[must_use]
    pub fn with_quota(quota: Quota) -> Self {
        Self::from_gate(Gate::Governor(RateLimiter::direct(quota)))
    }

    fn from_gate(gate: Gate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimit {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Service that waits for a permit before every call.
#[derive(Debug, Clone)]
pub struct RateLimit<S> {
    inner: S,
    gate: Arc<Gate>,
}

impl<S> RateLimit<S> {
    /// The wrapped service.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Service<Request> for RateLimit<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let request_id = request.id();
            let cancellation = request.cancellation().clone();
            let start = Instant::now();

            tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    debug!(%request_id, "cancelled while waiting for a rate limit permit");
                    return Err(Error::Cancelled);
                }
                () = gate.acquire() => {}
            }

            let waited = start.elapsed();
            if waited.is_zero() {
                trace!(%request_id, "rate limit permit granted");
            } else {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                debug!(%request_id, waited_ms, "rate limit permit granted after waiting");
            }

            inner.ready().await?.call(request).await
        })
    }
}

impl<S: Cancel> Cancel for RateLimit<S> {
    fn cancel_request(&self, request: &Request) {
        self.inner.cancel_request(request);
    }
}
