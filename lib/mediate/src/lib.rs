//! Composable resilience decorators for HTTP transports.
//!
//! Every decorator is a Tower layer over the [`Transport`] abstraction, so
//! retries, rate limits and body buffering stack in whatever order a
//! pipeline needs:
//!
//! - [`middleware::FixedRetryLayer`] - bounded retry with no backoff
//! - [`middleware::RateLimitLayer`] - rolling window or paced admission
//! - [`middleware::ReliableBodyLayer`] - fully buffered, re-readable bodies
//! - [`middleware::LoggingLayer`] - structured `tracing` output
//!
//! [`HyperTransport`] is the default base transport, and [`Client`] bundles
//! a base and its layers behind one type.
//!
//! # Example
//!
//! ```ignore
//! use mediate::prelude::*;
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .with_rate_limit(100, Duration::from_secs(1))
//!     .with_fixed_retries(3)
//!     .with_reliable_body()
//!     .build()?;
//!
//! let request = Request::builder(Method::GET, "https://api.example.com/users".parse()?).build();
//! let response = client.send(request).await?;
//! println!("{}", response.text().await?);
//! ```

mod cancel;
mod client;
mod config;
mod connector;
mod hyper_transport;
pub mod middleware;
pub mod prelude;

// Re-export client types
pub use client::{BoxedService, Client, ClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use hyper_transport::HyperTransport;
pub use middleware::{fixed_retries, rate_limited, reliable_body};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use mediate_core::{
    Body, BodyStream, Cancel, CancellationToken, Error, Request, RequestBuilder, RequestId,
    Response, Result, Transport,
};

// Re-export http types for methods, status codes and headers
pub use mediate_core::{HeaderMap, Method, StatusCode, header};

pub use url;
