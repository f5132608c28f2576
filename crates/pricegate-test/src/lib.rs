//! Helpers for testing the caching service and the HTTP transport.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using one of the server helpers, make sure that the [`Server`] is
//!    held until all requests to it have been made. If the server is dropped,
//!    the port closes and connections to it fail. Assign it to a variable:
//!    `let server = test::json_server(...)`.
//!
//!  - [`MockTransport`] tests run well under a paused tokio clock; the server
//!    helpers bind real sockets and need a real clock.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::response::{IntoResponse, Json};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

use pricegate::error::ApiError;
use pricegate::transport::{ApiRequest, Transport};

pub use axum::http::StatusCode;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `pricegate`
///    crate and mutes everything else.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("pricegate=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A scripted [`Transport`] that never touches the network.
///
/// Responses pushed with [`push_response`](Self::push_response) are served
/// first, in order; once the queue is empty every request gets a clone of the
/// fallback the transport was constructed with.
pub struct MockTransport {
    fallback: Result<Value, ApiError>,
    responses: Mutex<VecDeque<Result<Value, ApiError>>>,
    latency: Option<Duration>,
    hits: AtomicUsize,
}

impl MockTransport {
    /// A transport that answers every request with the given payload.
    pub fn answering(payload: Value) -> Self {
        Self::with_fallback(Ok(payload))
    }

    /// A transport that fails every request with the given error.
    pub fn failing(error: ApiError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<Value, ApiError>) -> Self {
        Self {
            fallback,
            responses: Mutex::new(VecDeque::new()),
            latency: None,
            hits: AtomicUsize::new(0),
        }
    }

    /// Delays every response by the given duration.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a one-shot response served before the fallback.
    pub fn push_response(&self, response: Result<Value, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// How many requests reached this transport.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(method = %request.method, path = %request.path, "mock transport hit");

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let latency = self.latency;

        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            response
        })
    }
}

/// A local HTTP server for transport tests.
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server from the given router.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.socket.port()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A server that answers every request with `200 OK` and the given JSON body.
pub fn json_server(payload: Value) -> Server {
    let router = Router::new().fallback(move || {
        let payload = payload.clone();
        async move { Json(payload) }
    });
    Server::with_router(router)
}

/// A server that answers every request with the given status and plain body.
pub fn raw_server(status: StatusCode, body: &'static str) -> Server {
    let router = Router::new().fallback(move || async move { (status, body).into_response() });
    Server::with_router(router)
}

/// Like [`json_server`], but also counts how many requests arrived.
pub fn counting_json_server(payload: Value) -> (Server, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = {
        let hits = hits.clone();
        Router::new().fallback(move || {
            hits.fetch_add(1, Ordering::SeqCst);
            let payload = payload.clone();
            async move { Json(payload) }
        })
    };
    (Server::with_router(router), hits)
}

/// A server that echoes the request back as a JSON object with the fields
/// `method`, `path`, `query`, `authorization` and `body`.
pub fn echo_server() -> Server {
    use axum::extract::{OriginalUri, RawQuery};
    use axum::http::HeaderMap;

    let router = Router::new().fallback(
        |method: axum::http::Method,
         OriginalUri(uri): OriginalUri,
         RawQuery(query): RawQuery,
         headers: HeaderMap,
         body: String| async move {
            let body: Option<Value> = serde_json::from_str(&body).ok();
            let authorization = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok());
            Json(serde_json::json!({
                "method": method.as_str(),
                "path": uri.path(),
                "query": query,
                "authorization": authorization,
                "body": body,
            }))
        },
    );
    Server::with_router(router)
}

/// A server that sleeps before answering, to provoke client timeouts.
pub fn slow_server(delay: Duration, payload: Value) -> Server {
    let router = Router::new().fallback(move || {
        let payload = payload.clone();
        async move {
            tokio::time::sleep(delay).await;
            Json(payload)
        }
    });
    Server::with_router(router)
}
