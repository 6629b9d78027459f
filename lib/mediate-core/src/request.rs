//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers, query parameters, and bodies.
//!
//! # Example
//!
//! ```
//! use mediate_core::{Method, Request};
//!
//! let request = Request::builder(Method::GET, "https://api.example.com".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::{Body, Error, Method, Result};

/// Process-unique identity of a logical request.
///
/// Copies made with [`Request::try_clone`] keep the id of their original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("req-{_0}")]
pub struct RequestId(u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// An HTTP request with method, URL, headers, body and cancellation signal.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Body,
    cancellation: CancellationToken,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Identity shared by this request and all of its copies.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Cancellation signal observed by transports while this request is in flight.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Copy the request so it can be sent again.
    ///
    /// The copy has the same id, method, URL, headers and cancellation
    /// signal, and its own reader over the same body content. Returns `None`
    /// when the body is a single-use stream.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        let body = self.body.try_clone()?;
        Some(Self {
            id: self.id,
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            cancellation: self.cancellation.clone(),
        })
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, HeaderMap, Body) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    body: Body,
    cancellation: Option<CancellationToken>,
    error: Option<Error>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::empty(),
            cancellation: None,
            error: None,
        }
    }

    /// Appends a header value. Existing values for the same name are kept.
    ///
    /// Invalid names or values are reported by [`RequestBuilder::try_build`].
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert_with(|| {
                    Error::invalid_request(format!("invalid header {name}"))
                });
            }
        }
        self
    }

    /// Appends every entry of a header map.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut last = None;
        for (name, value) in headers {
            if let Some(name) = name {
                last = Some(name);
            }
            if let Some(name) = &last {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Uses a caller-owned cancellation signal instead of a fresh one.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Builds the [`Request`], rejecting invalid headers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if a header name or value was invalid.
    pub fn try_build(mut self) -> Result<Request> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        Ok(self.build())
    }

    /// Builds the [`Request`]. Invalid headers are dropped.
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            id: RequestId::next(),
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            cancellation: self.cancellation.unwrap_or_default(),
        }
    }
}
