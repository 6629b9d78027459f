//! Request and response bodies.
//!
//! A [`Body`] is either empty, fully buffered, or a single-use stream of
//! chunks. Only the first two can be copied: a stream has no copy operation,
//! so two owners can never race on the same half-read stream.

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{StreamExt, stream};

use crate::Result;

/// A streaming body: chunks of bytes arriving over time.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// HTTP message body.
#[derive(Default)]
pub struct Body {
    kind: Kind,
}

#[derive(Default)]
enum Kind {
    #[default]
    Empty,
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl Body {
    /// An empty body.
    #[must_use]
    pub const fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A fully buffered body.
    #[must_use]
    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Buffered(bytes.into()),
        }
    }

    /// A single-use streaming body.
    #[must_use]
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            kind: Kind::Streaming(Box::pin(stream)),
        }
    }

    /// Returns `true` for an empty body.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// Returns `true` when the body can be read more than once.
    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        !matches!(self.kind, Kind::Streaming(_))
    }

    /// Buffered content, if the body is not a stream.
    ///
    /// An empty body yields an empty slice.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[][..]),
            Kind::Buffered(bytes) => Some(bytes.as_ref()),
            Kind::Streaming(_) => None,
        }
    }

    /// Copy a replayable body. Returns `None` for a stream.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        let kind = match &self.kind {
            Kind::Empty => Kind::Empty,
            Kind::Buffered(bytes) => Kind::Buffered(bytes.clone()),
            Kind::Streaming(_) => return None,
        };
        Some(Self { kind })
    }

    /// Read the whole body into memory.
    ///
    /// A stream is drained to completion and dropped whether or not a chunk
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the stream.
    pub async fn collect(self) -> Result<Bytes> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Buffered(bytes) => Ok(bytes),
            Kind::Streaming(mut chunks) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(collected.freeze())
            }
        }
    }

    /// Take the buffered content, or give the stream back unchanged.
    ///
    /// # Errors
    ///
    /// Returns the body itself when it is a stream.
    pub fn try_into_bytes(self) -> std::result::Result<Bytes, Self> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Buffered(bytes) => Ok(bytes),
            kind @ Kind::Streaming(_) => Err(Self { kind }),
        }
    }

    /// Consume into a stream of chunks, whatever the representation.
    #[must_use]
    pub fn into_stream(self) -> BodyStream {
        match self.kind {
            Kind::Empty => Box::pin(stream::empty()),
            Kind::Buffered(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            Kind::Streaming(chunks) => chunks,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Buffered(bytes) => f.debug_tuple("Body::Buffered").field(&bytes.len()).finish(),
            Kind::Streaming(_) => f.write_str("Body::Streaming"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::buffered(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::buffered(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::buffered(text)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::buffered(text)
    }
}
