//! Fixed-count retry middleware.
//!
//! Re-sends a failed request until one attempt succeeds or the attempt budget
//! is spent. Attempts follow each other immediately, with no backoff.

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};
use tracing::{debug, warn};

use crate::{Cancel, Error, Request, Response, Result};

/// Layer that retries failed requests a fixed number of times.
///
/// `attempts` is the total number of calls made to the inner service, the
/// first one included.
///
/// # Example
///
/// ```ignore
/// use mediate::middleware::FixedRetryLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(FixedRetryLayer::try_new(3)?)
///     .service(transport);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedRetryLayer {
    attempts: NonZeroU32,
}

impl FixedRetryLayer {
    /// Create a retry layer making at most `attempts` calls per request.
    #[must_use]
    pub const fn new(attempts: NonZeroU32) -> Self {
        Self { attempts }
    }

    /// Create a retry layer, rejecting an empty attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `attempts` is zero.
    pub fn try_new(attempts: u32) -> Result<Self> {
        NonZeroU32::new(attempts)
            .map(Self::new)
            .ok_or_else(|| Error::invalid_config("fixed retry needs at least one attempt"))
    }

    /// Total attempt budget per request.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl<S> Layer<S> for FixedRetryLayer {
    type Service = FixedRetry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FixedRetry::new(inner, self.attempts)
    }
}

/// Service that retries failed requests a fixed number of times.
#[derive(Debug, Clone)]
pub struct FixedRetry<S> {
    inner: S,
    attempts: NonZeroU32,
}

impl<S> FixedRetry<S> {
    /// Wrap `inner`, making at most `attempts` calls per request.
    pub const fn new(inner: S, attempts: NonZeroU32) -> Self {
        Self { inner, attempts }
    }

    /// The wrapped service.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Service<Request> for FixedRetry<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Readiness of the inner service is awaited before every attempt.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(send_with_retries(inner, request, self.attempts.get()))
    }
}

async fn send_with_retries<S>(mut inner: S, mut request: Request, attempts: u32) -> Result<Response>
where
    S: Service<Request, Response = Response, Error = Error>,
{
    let request_id = request.id();
    let mut attempt = 1;

    loop {
        // The caller's request stays untouched: every attempt but the last
        // sends a copy, the last one sends the original.
        let (current, next) = if attempt < attempts {
            match request.try_clone() {
                Some(copy) => (copy, Some(request)),
                None => (request, None),
            }
        } else {
            (request, None)
        };

        let result = match inner.ready().await {
            Ok(service) => service.call(current).await,
            Err(error) => Err(error),
        };

        let error = match result {
            Ok(response) => {
                if attempt > 1 {
                    debug!(%request_id, attempt, "request succeeded after retry");
                }
                return Ok(response);
            }
            Err(error) => error,
        };

        if error.is_cancelled() {
            debug!(%request_id, attempt, "request cancelled, not retrying");
            return Err(error);
        }

        match next {
            Some(original) => {
                debug!(%request_id, attempt, attempts, error = %error, "attempt failed, retrying");
                request = original;
                attempt += 1;
            }
            None if attempt < attempts => {
                warn!(
                    %request_id,
                    attempt,
                    attempts,
                    error = %error,
                    "attempt failed and the streaming request body cannot be replayed"
                );
                return Err(error);
            }
            None => {
                warn!(%request_id, attempts, error = %error, "all attempts failed");
                return Err(error);
            }
        }
    }
}

impl<S: Cancel> Cancel for FixedRetry<S> {
    fn cancel_request(&self, request: &Request) {
        self.inner.cancel_request(request);
    }
}
