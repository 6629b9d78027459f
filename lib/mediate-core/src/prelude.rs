//! Prelude module for convenient imports.
//!
//! ```ignore
//! use mediate_core::prelude::*;
//! ```

pub use crate::{
    Body, Cancel, CancellationToken, Error, HeaderMap, Method, Request, RequestBuilder, Response,
    Result, Transport,
};
