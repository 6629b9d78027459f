//! Scripted transport used by the middleware unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream;
use http::HeaderMap;
use tokio::time::Instant;
use tower::Service;

use crate::{Body, Cancel, Error, Method, Request, RequestId, Response, Result};

/// What the mock answers to one call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Buffered response with a status and body.
    Status(u16, &'static str),
    /// Streaming response made of chunks, optionally failing after them.
    Stream(Vec<&'static str>, Option<&'static str>),
    /// Connection failure; the message names the call number.
    Fail,
}

#[derive(Debug, Default)]
struct State {
    calls: AtomicU32,
    script: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    admissions: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<(RequestId, Option<Bytes>)>>,
    cancelled: Mutex<Vec<RequestId>>,
}

/// Mock service that answers from a script and records what it saw.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<State>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Answers every call with `reply`.
    pub(crate) fn always(reply: Reply) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    /// Answers with `script` in order, then with `fallback` forever.
    pub(crate) fn scripted(script: Vec<Reply>, fallback: Reply) -> Self {
        let mock = Self::default();
        *lock(&mock.state.script) = script.into();
        *lock(&mock.state.fallback) = Some(fallback);
        mock
    }

    pub(crate) fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn admissions(&self) -> Vec<Instant> {
        lock(&self.state.admissions).clone()
    }

    pub(crate) fn requests(&self) -> Vec<(RequestId, Option<Bytes>)> {
        lock(&self.state.requests).clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<RequestId> {
        lock(&self.state.cancelled).clone()
    }

    fn next_reply(&self) -> Reply {
        lock(&self.state.script)
            .pop_front()
            .or_else(|| lock(&self.state.fallback).clone())
            .unwrap_or(Reply::Fail)
    }
}

impl Service<Request> for MockTransport {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.state.admissions).push(Instant::now());
        let body = request.body().as_bytes().map(Bytes::copy_from_slice);
        lock(&self.state.requests).push((request.id(), body));

        let reply = self.next_reply();
        Box::pin(async move {
            match reply {
                Reply::Status(status, body) => Ok(Response::new(status, HeaderMap::new(), body)),
                Reply::Stream(chunks, failure) => {
                    let mut items: Vec<Result<Bytes>> = chunks
                        .into_iter()
                        .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
                        .collect();
                    if let Some(message) = failure {
                        items.push(Err(Error::connection(message)));
                    }
                    Ok(Response::new(
                        200,
                        HeaderMap::new(),
                        Body::streaming(stream::iter(items)),
                    ))
                }
                Reply::Fail => Err(Error::connection(format!("call {call} failed"))),
            }
        })
    }
}

impl Cancel for MockTransport {
    fn cancel_request(&self, request: &Request) {
        lock(&self.state.cancelled).push(request.id());
    }
}

/// A GET request to a fixed test URL.
pub(crate) fn get() -> Request {
    Request::builder(Method::GET, test_url()).build()
}

/// A POST request with a buffered body.
pub(crate) fn post(body: &'static str) -> Request {
    Request::builder(Method::POST, test_url()).body(body).build()
}

fn test_url() -> url::Url {
    url::Url::parse("https://example.com/test").expect("valid url")
}
