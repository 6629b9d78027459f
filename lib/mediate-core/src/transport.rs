//! Transport capability traits.
//!
//! - [`Transport`] - send a request, get a response or an error
//! - [`Cancel`] - optional capability to abort an in-flight request
//!
//! Every cloneable `tower` service over [`Request`]/[`Response`] is a
//! [`Transport`], so decorators built as layers compose freely.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::poll_fn;
use tower_service::Service;

use crate::{Error, Request, Response, Result};

/// Core transport trait.
///
/// Exactly one of a response or an error is produced for each request.
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails for any reason:
    /// - Network or TLS errors
    /// - Timeouts
    /// - Cancellation
    /// - Failures added by decorators (for instance a body read error)
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<S> Transport for S
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync,
    S::Future: Send,
{
    fn send(&self, request: Request) -> impl Future<Output = Result<Response>> + Send {
        let mut service = self.clone();
        async move {
            poll_fn(|cx| service.poll_ready(cx)).await?;
            service.call(request).await
        }
    }
}

/// Cooperative cancellation of in-flight requests.
///
/// Decorators implement this exactly when the service they wrap does, and
/// forward the call unchanged. Cancelling a request that is not in flight is
/// a no-op.
pub trait Cancel {
    /// Abort the exchange for `request` (or any of its copies) if it is in flight.
    fn cancel_request(&self, request: &Request);
}

impl<C: Cancel + ?Sized> Cancel for Arc<C> {
    fn cancel_request(&self, request: &Request) {
        (**self).cancel_request(request);
    }
}

impl<C: Cancel + ?Sized> Cancel for &C {
    fn cancel_request(&self, request: &Request) {
        (**self).cancel_request(request);
    }
}
