//! Integration tests for `Client` and `HyperTransport` using wiremock.

use std::time::Duration;

use mediate::{Client, Method, Request, Transport};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, header, method, path},
};

fn url(server: &MockServer, route: &str) -> url::Url {
    url::Url::parse(&format!("{}{route}", server.uri())).expect("url")
}

#[tokio::test]
async fn test_get_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1,"name":"Alice"}"#))
        .mount(&mock_server)
        .await;

    let client = Client::new();
    let request = Request::builder(Method::GET, url(&mock_server, "/users/1"))
        .header("Accept", "application/json")
        .build();

    let response = client.send(request).await.expect("response");

    assert!(response.is_success());
    assert_eq!(response.text().await.expect("body"), r#"{"id":1,"name":"Alice"}"#);
}

#[tokio::test]
async fn test_post_request_with_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_string("name=Bob"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder().with_reliable_body().build().expect("client");
    let request = Request::builder(Method::POST, url(&mock_server, "/users"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("name=Bob")
        .build();

    let response = client.send(request).await.expect("response");

    assert_eq!(response.status(), 201);
    assert_eq!(response.body().as_bytes(), Some(&b"created"[..]));
}

#[tokio::test]
async fn test_query_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(wiremock::matchers::query_param("q", "rust lang"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder(Method::GET, url(&mock_server, "/search"))
        .query("q", "rust lang")
        .build();

    let response = Client::new().send(request).await.expect("response");
    assert!(response.is_success());
}

#[tokio::test]
async fn test_error_statuses_are_responses() {
    let mock_server = MockServer::start().await;

    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&mock_server)
        .await;

    let client = Client::builder().with_reliable_body().build().expect("client");
    let request = Request::builder(Method::GET, url(&mock_server, "/missing")).build();

    let response = client.send(request).await.expect("response");

    assert!(response.is_client_error());
    assert_eq!(response.text().await.expect("body"), "not found");
}

#[tokio::test]
async fn test_reliable_body_is_readable_twice() {
    let mock_server = MockServer::start().await;
    let payload = "x".repeat(64 * 1024);

    Mock::given(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload.clone()))
        .mount(&mock_server)
        .await;

    let client = Client::builder().with_reliable_body().build().expect("client");
    let request = Request::builder(Method::GET, url(&mock_server, "/large")).build();

    let response = client.send(request).await.expect("response");
    let copy = response.try_clone().expect("buffered response clones");

    assert_eq!(copy.text().await.expect("first read"), payload);
    assert_eq!(response.text().await.expect("second read"), payload);
}

#[tokio::test]
async fn test_timeout_error() {
    let mock_server = MockServer::start().await;

    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .expect("client");
    let request = Request::builder(Method::GET, url(&mock_server, "/slow")).build();

    let err = client.send(request).await.expect_err("timeout");
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_user_agent_header() {
    let mock_server = MockServer::start().await;

    Mock::given(header("User-Agent", mediate::DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder(Method::GET, url(&mock_server, "/")).build();
    let response = Client::new().send(request).await.expect("response");

    assert_eq!(response.status(), 204);
}
