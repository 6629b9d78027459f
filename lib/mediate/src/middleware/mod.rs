//! Tower middleware layers for mediate transports.
//!
//! Each decorator is a `tower` [`Layer`] producing a service that is itself a
//! [`Transport`](crate::Transport), so decorators stack in any order. When
//! layers are applied with [`ServiceBuilder`], the first layer added is the
//! outermost one and sees the request first.
//!
//! # Available Layers
//!
//! | Layer | Behavior |
//! |-------|----------|
//! | [`FixedRetryLayer`] | Re-sends failed requests up to a fixed attempt count |
//! | [`ReliableBodyLayer`] | Buffers response bodies so they can be read again |
//! | [`RateLimitLayer`] | Waits for a permit before every call |
//! | [`LoggingLayer`] | Logs requests/responses using `tracing` |
//!
//! Every decorator forwards [`Cancel`](crate::Cancel) to the service it wraps,
//! provided that service supports cancellation.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mediate::HyperTransport;
//! use mediate::middleware::{FixedRetryLayer, RateLimitLayer, ReliableBodyLayer, ServiceBuilder};
//!
//! let transport = ServiceBuilder::new()
//!     .layer(RateLimitLayer::new(100, Duration::from_secs(1))?)
//!     .layer(FixedRetryLayer::try_new(3)?)
//!     .layer(ReliableBodyLayer::new())
//!     .service(HyperTransport::default());
//! ```

use std::time::Duration;

mod fixed_retry;
mod logging;
#[cfg(test)]
pub(crate) mod mock;
mod rate_limit;
mod reliable_body;

pub use fixed_retry::{FixedRetry, FixedRetryLayer};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use rate_limit::{RateLimit, RateLimitLayer};
pub use reliable_body::{ReliableBody, ReliableBodyLayer};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};

use crate::Result;

/// Wrap `inner` so each request is attempted at most `attempts` times.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `attempts` is zero.
pub fn fixed_retries<S>(attempts: u32, inner: S) -> Result<FixedRetry<S>> {
    Ok(FixedRetryLayer::try_new(attempts)?.layer(inner))
}

/// Wrap `inner` so every response body is fully buffered.
pub fn reliable_body<S>(inner: S) -> ReliableBody<S> {
    ReliableBody::new(inner)
}

/// Wrap `inner` so at most `limit` calls start in any rolling `window`.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `limit`
/// is zero or `window` is empty.
pub fn rate_limited<S>(limit: u32, window: Duration, inner: S) -> Result<RateLimit<S>> {
    Ok(RateLimitLayer::new(limit, window)?.layer(inner))
}
