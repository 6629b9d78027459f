//! HTTP response handling.
//!
//! [`Response`] carries status, headers and a [`Body`]. The body coming from a
//! network transport is a single-use stream until something buffers it.

use bytes::Bytes;
use http::header::HeaderMap;

use crate::{Body, Result};

/// HTTP response with status, headers, and body.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    /// Copy the response. Returns `None` while the body is still a stream.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        let body = self.body.try_clone()?;
        Some(Self {
            status: self.status,
            headers: self.headers.clone(),
            body,
        })
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Read the whole body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.collect().await
    }

    /// Read the whole body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body stream fails or is not valid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| crate::Error::body_read(format!("body is not UTF-8: {err}")))
    }
}
