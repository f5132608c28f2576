//! The boundary to the actual HTTP backend.
//!
//! The engine treats the transport as an opaque asynchronous function; the
//! bundled [`HttpTransport`] talks to the real API proxy, tests substitute
//! their own implementation.

use std::fmt;

use futures::future::BoxFuture;

use crate::error::ApiError;

mod http;

pub use http::HttpTransport;

/// HTTP verbs the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the remote API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Query parameters, already sorted by the key derivation.
    pub query: Vec<(String, String)>,
    /// JSON body for mutations.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query,
            body: None,
        }
    }

    pub fn write(method: Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }
}

/// An asynchronous connection to the backend.
///
/// Implementations are expected to apply their own request timeout; the
/// coordinator treats a timeout like any other failure. The returned future
/// must be `'static`, implementations move cheaply cloneable clients into it.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<serde_json::Value, ApiError>>;
}
