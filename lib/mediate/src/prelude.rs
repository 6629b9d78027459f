//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits for easy
//! glob importing:
//!
//! ```ignore
//! use mediate::prelude::*;
//! ```

pub use crate::middleware::{FixedRetryLayer, LoggingLayer, RateLimitLayer, ReliableBodyLayer};
pub use crate::{
    Body, Cancel, CancellationToken, Client, ClientConfig, Error, HyperTransport, Method, Request,
    RequestBuilder, Response, Result, StatusCode, Transport, header,
};
