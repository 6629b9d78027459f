//! Reliable body middleware.
//!
//! Drains every response body into memory so callers get a body they can
//! read as many times as they like. Memory use grows with response size.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};
use tracing::warn;

use crate::{Body, Cancel, Error, Request, Response, Result};

/// Layer that buffers response bodies in memory.
///
/// # Example
///
/// ```ignore
/// use mediate::middleware::ReliableBodyLayer;
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(ReliableBodyLayer::new())
///     .service(transport);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ReliableBodyLayer {
    _private: (),
}

impl ReliableBodyLayer {
    /// Create a new reliable body layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for ReliableBodyLayer {
    type Service = ReliableBody<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReliableBody { inner }
    }
}

/// Service that returns responses with fully buffered bodies.
#[derive(Debug, Clone)]
pub struct ReliableBody<S> {
    inner: S,
}

impl<S> ReliableBody<S> {
    /// Create a new reliable body service wrapping the given service.
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The wrapped service.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Service<Request> for ReliableBody<S>
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
        let request_id = request.id();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.ready().await?.call(request).await?;
            let (status, headers, body) = response.into_parts();

            // `collect` owns the stream, so it is closed on every path out.
            let bytes = body.collect().await.map_err(|err| {
                warn!(%request_id, status, error = %err, "failed to buffer response body");
                Error::body_read(err.to_string())
            })?;

            Ok(Response::new(status, headers, Body::buffered(bytes)))
        })
    }
}

impl<S: Cancel> Cancel for ReliableBody<S> {
    fn cancel_request(&self, request: &Request) {
        self.inner.cancel_request(request);
    }
}
