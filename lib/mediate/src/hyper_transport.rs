//! Base transport over the pooled `hyper-util` client.

use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::HeaderValue;
use http::header::USER_AGENT;
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as PooledClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tower_service::Service;
use tracing::{debug, warn};

use crate::cancel::InFlight;
use crate::connector::https_connector;
use crate::{Body, Cancel, ClientConfig, Error, Request, RequestId, Response, Result};

/// Body type handed to hyper.
type WireBody = UnsyncBoxBody<Bytes, Error>;

/// Platform-default transport: pooled connections, rustls TLS, HTTP/1.1 and
/// HTTP/2.
///
/// Responses carry a streaming body read straight off the connection; wrap
/// the transport in [`ReliableBody`](crate::middleware::ReliableBody) to get
/// buffered bodies.
///
/// Each exchange races the request's cancellation signal and the configured
/// timeout. Both cover the exchange up to the response head; reading the
/// body afterwards is up to the caller.
///
/// Clones share the connection pool and the in-flight registry, so any clone
/// can cancel a request sent through another.
#[derive(Clone)]
pub struct HyperTransport {
    client: PooledClient<HttpsConnector<HttpConnector>, WireBody>,
    config: ClientConfig,
    user_agent: Option<HeaderValue>,
    in_flight: InFlight,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport with the given configuration.
    ///
    /// A user agent that is not a valid header value is ignored; use
    /// [`ClientConfig::validate`] to reject it instead.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let client = PooledClient::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(https_connector(&config));

        let user_agent = config.user_agent.as_deref().and_then(|agent| {
            HeaderValue::from_str(agent)
                .inspect_err(|err| warn!(error = %err, "ignoring invalid user agent"))
                .ok()
        });

        Self {
            client,
            config,
            user_agent,
            in_flight: InFlight::default(),
        }
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns `true` while a request with this id is being exchanged.
    #[must_use]
    pub fn is_in_flight(&self, id: RequestId) -> bool {
        self.in_flight.contains(id)
    }

    fn wire_request(&self, request: Request) -> Result<http::Request<WireBody>> {
        let (method, url, headers, body) = request.into_parts();

        let mut wire = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(wire_body(body))
            .map_err(|err| Error::invalid_request(err.to_string()))?;

        *wire.headers_mut() = headers;
        if let Some(agent) = &self.user_agent
            && !wire.headers().contains_key(USER_AGENT)
        {
            wire.headers_mut().insert(USER_AGENT, agent.clone());
        }

        Ok(wire)
    }

    async fn execute(self, request: Request) -> Result<Response> {
        let request_id = request.id();
        let cancellation = request.cancellation().clone();
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _registered = self.in_flight.register(request_id, &cancellation);
        let wire = self.wire_request(request)?;
        let exchange = tokio::time::timeout(self.config.timeout, self.client.request(wire));

        let response = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                debug!(%request_id, "exchange cancelled");
                return Err(Error::Cancelled);
            }
            outcome = exchange => outcome
                .map_err(|_| Error::Timeout)?
                .map_err(map_hyper_error)?,
        };

        let (parts, incoming) = response.into_parts();
        let chunks = incoming
            .into_data_stream()
            .map_err(|err| Error::connection(err.to_string()));

        Ok(Response::new(
            parts.status.as_u16(),
            parts.headers,
            Body::streaming(chunks),
        ))
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

fn wire_body(body: Body) -> WireBody {
    match body.try_into_bytes() {
        Ok(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        Err(stream) => StreamBody::new(stream.into_stream().map_ok(Frame::data)).boxed_unsync(),
    }
}

/// Map a hyper client error, walking its sources for TLS failures.
#[allow(clippy::needless_pass_by_value)]
fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let lowered = message.to_ascii_lowercase();
    if lowered.contains("tls") || lowered.contains("ssl") || lowered.contains("certificate") {
        return Error::tls(message);
    }

    Error::connection(message)
}

impl Service<Request> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(transport.execute(request))
    }
}

impl Cancel for HyperTransport {
    fn cancel_request(&self, request: &Request) {
        let request_id = request.id();
        if self.in_flight.cancel(request_id) {
            debug!(%request_id, "cancelling in-flight request");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{Method, Transport};

    fn url(server: &MockServer, route: &str) -> url::Url {
        url::Url::parse(&format!("{}{route}", server.uri())).expect("valid url")
    }

    #[tokio::test]
    async fn response_body_streams_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let transport = HyperTransport::default();
        let request = Request::builder(Method::GET, url(&server, "/hello")).build();
        let id = request.id();
        let response = transport.send(request).await.expect("response");

        assert_eq!(response.status(), 200);
        assert!(!response.body().is_replayable());
        assert!(!transport.is_in_flight(id));
        assert_eq!(response.text().await.expect("body"), "hello");
    }

    #[tokio::test]
    async fn sends_buffered_and_streaming_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_string("one-two"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let transport = HyperTransport::default();

        let buffered = Request::builder(Method::POST, url(&server, "/echo"))
            .body("one-two")
            .build();
        let response = transport.send(buffered).await.expect("response");
        assert_eq!(response.status(), 201);

        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"one-")),
            Ok(Bytes::from_static(b"two")),
        ];
        let streaming = Request::builder(Method::POST, url(&server, "/echo"))
            .body(Body::streaming(stream::iter(chunks)))
            .build();
        let response = transport.send(streaming).await.expect("response");
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn adds_user_agent_when_missing() {
        let server = MockServer::start().await;
        Mock::given(header("user-agent", "mediate-tests/1.0"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(header("user-agent", "caller/2.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::builder().user_agent("mediate-tests/1.0").build();
        let transport = HyperTransport::new(config);

        let plain = Request::builder(Method::GET, url(&server, "/")).build();
        assert_eq!(transport.send(plain).await.expect("response").status(), 204);

        let explicit = Request::builder(Method::GET, url(&server, "/"))
            .header("User-Agent", "caller/2.0")
            .build();
        assert_eq!(transport.send(explicit).await.expect("response").status(), 200);
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_exchange() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let transport = HyperTransport::default();
        let request = Request::builder(Method::GET, url(&server, "/slow")).build();
        let handle = request.try_clone().expect("empty body clones");

        let exchange = tokio::spawn({
            let transport = transport.clone();
            async move { transport.send(request).await }
        });
        while !transport.is_in_flight(handle.id()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        transport.cancel_request(&handle);

        let err = exchange.await.expect("task").expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(!transport.is_in_flight(handle.id()));
    }

    #[tokio::test]
    async fn cancel_of_idle_request_is_noop() {
        let server = MockServer::start().await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HyperTransport::default();
        let request = Request::builder(Method::GET, url(&server, "/ok")).build();

        transport.cancel_request(&request);

        assert!(!request.cancellation().is_cancelled());
        let response = transport.send(request).await.expect("response");
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn already_cancelled_request_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(path("/never"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let request = Request::builder(Method::GET, url(&server, "/never")).build();
        request.cancellation().cancel();

        let err = HyperTransport::default()
            .send(request)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ClientConfig::builder()
            .timeout(Duration::from_millis(100))
            .build();
        let request = Request::builder(Method::GET, url(&server, "/slow")).build();

        let err = HyperTransport::new(config)
            .send(request)
            .await
            .expect_err("timeout");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let request = Request::builder(
            Method::GET,
            url::Url::parse("http://127.0.0.1:9/").expect("valid url"),
        )
        .build();

        let err = HyperTransport::default()
            .send(request)
            .await
            .expect_err("refused");
        assert!(err.is_connection());
    }
}
