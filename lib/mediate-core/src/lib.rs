//! Core types and traits for the mediate resilient HTTP transport.
//!
//! This crate provides the foundational types used by mediate:
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Body`] - empty, buffered or single-use streaming message body
//! - [`Error`] and [`Result`] - Error handling
//! - [`Transport`] - Core "send a request, get a response" capability
//! - [`Cancel`] - Optional cancellation of in-flight requests
//! - [`Method`], [`StatusCode`] and [`header`] - re-exported from the `http` crate

mod body;
mod error;
pub mod prelude;
mod request;
mod response;
mod transport;

pub use body::{Body, BodyStream};
pub use error::{Error, Result};
pub use request::{Request, RequestBuilder, RequestId};
pub use response::Response;
pub use transport::{Cancel, Transport};

// Re-export http crate types for methods, status codes and headers
pub use http::{HeaderMap, Method, StatusCode, header};

// Re-export the cancellation signal carried by requests
pub use tokio_util::sync::CancellationToken;
