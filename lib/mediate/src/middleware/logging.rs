//! Request/response logging middleware.
//!
//! This middleware logs every exchange using the `tracing` crate, inside an
//! `http_request` span carrying the method, URL and request id.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service, ServiceExt};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{Cancel, Error, Request, Response, Result};

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use mediate::middleware::LoggingLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(LoggingLayer::new())
///     .service(transport);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// The configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

impl<S> Logging<S> {
    /// Create a new logging service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: LogLevel::Info,
        }
    }
}

impl<S> Service<Request> for Logging<S>
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
        let span = info_span!(
            "http_request",
            method = %request.method(),
            url = %request.url(),
            request_id = %request.id(),
        );
        let verbose = self.level == LogLevel::Debug;
        Box::pin(logged(self.inner.clone(), request, verbose).instrument(span))
    }
}

async fn logged<S>(mut inner: S, request: Request, verbose: bool) -> Result<Response>
where
    S: Service<Request, Response = Response, Error = Error>,
{
    if verbose {
        debug!(headers = ?request.headers(), body = ?request.body(), "sending request");
    } else {
        info!("sending request");
    }

    let start = Instant::now();
    let result = inner.ready().await?.call(request).await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &result {
        Ok(response) => {
            let status = response.status();
            if response.is_success() {
                info!(status, elapsed_ms, "response received");
            } else {
                warn!(status, elapsed_ms, "response has a non-success status");
            }
            if verbose {
                debug!(headers = ?response.headers(), body = ?response.body(), "response details");
            }
        }
        Err(Error::Cancelled) => info!(elapsed_ms, "request cancelled"),
        Err(error) => warn!(%error, elapsed_ms, "exchange failed"),
    }

    result
}

impl<S: Cancel> Cancel for Logging<S> {
    fn cancel_request(&self, request: &Request) {
        debug!(request_id = %request.id(), "forwarding cancellation");
        self.inner.cancel_request(request);
    }
}
