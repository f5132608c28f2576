//! Tests for [`HttpTransport`] against a real local server.
//!
//! These bind real sockets and therefore run on the real clock.

use std::time::Duration;

use pricegate::config::HttpConfig;
use pricegate::error::ApiError;
use pricegate::transport::{ApiRequest, HttpTransport, Method, Transport};
use serde_json::json;

use pricegate_test::{self as test, StatusCode};

fn transport_for(server: &test::Server, token: Option<&str>) -> HttpTransport {
    let config = HttpConfig {
        base_url: server.url("/"),
        bearer_token: token.map(String::from),
        timeout: Duration::from_secs(5),
    };
    HttpTransport::new(&config).unwrap()
}

#[tokio::test]
async fn test_get_sends_query_and_auth() {
    test::setup();
    let server = test::echo_server();
    let transport = transport_for(&server, Some("sekret"));

    let request = ApiRequest::get(
        "plans/7",
        vec![("currency".to_owned(), "eur".to_owned())],
    );
    let payload = transport.send(request).await.unwrap();

    assert_eq!(payload["method"], "GET");
    assert_eq!(payload["path"], "/plans/7");
    assert_eq!(payload["query"], "currency=eur");
    assert_eq!(payload["authorization"], "Bearer sekret");
    assert_eq!(payload["body"], json!(null));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    test::setup();
    let server = test::echo_server();
    let transport = transport_for(&server, None);

    let body = json!({"title": "Deluxe", "price": 995});
    let request = ApiRequest::write(Method::Post, "plans", Some(body.clone()));
    let payload = transport.send(request).await.unwrap();

    assert_eq!(payload["method"], "POST");
    assert_eq!(payload["body"], body);
    assert_eq!(payload["authorization"], json!(null));
}

#[tokio::test]
async fn test_error_status_carries_the_body_excerpt() {
    test::setup();
    let server = test::raw_server(StatusCode::SERVICE_UNAVAILABLE, "maintenance window");
    let transport = transport_for(&server, None);

    let error = transport
        .send(ApiRequest::get("plans", vec![]))
        .await
        .unwrap_err();

    let ApiError::Transport(message) = error else {
        panic!("expected a transport error, got {error:?}");
    };
    assert!(message.contains("503"), "{message}");
    assert!(message.contains("maintenance window"), "{message}");
}

#[tokio::test]
async fn test_invalid_json_is_a_decode_error() {
    test::setup();
    let server = test::raw_server(StatusCode::OK, "<html>definitely not json</html>");
    let transport = transport_for(&server, None);

    let error = transport
        .send(ApiRequest::get("plans", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::Decode(_)), "{error:?}");
}

#[tokio::test]
async fn test_slow_responses_time_out() {
    test::setup();
    let server = test::slow_server(Duration::from_secs(5), json!({}));

    let config = HttpConfig {
        base_url: server.url("/"),
        bearer_token: None,
        timeout: Duration::from_millis(100),
    };
    let transport = HttpTransport::new(&config).unwrap();

    let error = transport
        .send(ApiRequest::get("plans", vec![]))
        .await
        .unwrap_err();
    assert_eq!(error, ApiError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    test::setup();
    let config = HttpConfig {
        // Port 1 is never listening.
        base_url: "http://127.0.0.1:1/".parse().unwrap(),
        bearer_token: None,
        timeout: Duration::from_secs(1),
    };
    let transport = HttpTransport::new(&config).unwrap();

    let error = transport
        .send(ApiRequest::get("plans", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::Transport(_)), "{error:?}");
}
