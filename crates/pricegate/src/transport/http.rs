use std::error::Error;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, header};
use url::Url;

use crate::config::HttpConfig;
use crate::error::ApiError;

use super::{ApiRequest, Method, Transport};

const USER_AGENT: &str = concat!("pricegate/", env!("CARGO_PKG_VERSION"));

/// How much of an error response body is carried into the error message.
const BODY_EXCERPT_LEN: usize = 200;

/// Transport implementation backed by a [`reqwest::Client`].
///
/// The upstream groups all resources under one HTTP proxy with bearer-token
/// auth; this transport only attaches the token, any request signing stays on
/// the proxy side. The request timeout is enforced by the client itself.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            bearer_token: config.bearer_token.clone(),
            timeout: config.timeout,
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        self.base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport(format!("invalid request path: {e}")))
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<serde_json::Value, ApiError>> {
        let url = match self.url_for(&request) {
            Ok(url) => url,
            Err(err) => return futures::future::ready(Err(err)).boxed(),
        };

        let client = self.client.clone();
        let bearer_token = self.bearer_token.clone();
        let timeout = self.timeout;

        let future = async move {
            tracing::debug!(method = %request.method, %url, "sending api request");

            let mut builder = client
                .request(request.method.into(), url)
                .header(header::USER_AGENT, USER_AGENT)
                .query(&request.query);
            if let Some(token) = &bearer_token {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;

            let status = response.status();
            if !status.is_success() {
                let details = response.text().await.unwrap_or_default();
                return Err(status_error(status, &details));
            }

            response.json().await.map_err(|e| {
                if e.is_decode() {
                    ApiError::Decode(root_cause(&e))
                } else {
                    transport_error(e, timeout)
                }
            })
        };
        future.boxed()
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(timeout)
    } else {
        ApiError::Transport(root_cause(&error))
    }
}

/// Walks the source chain down to the innermost error, which carries the
/// actually useful message for connection-level failures.
fn root_cause(error: &dyn Error) -> String {
    let mut error = error;
    while let Some(source) = error.source() {
        error = source;
    }
    error.to_string()
}

fn status_error(status: StatusCode, details: &str) -> ApiError {
    let details = details.trim();
    if details.is_empty() {
        ApiError::Transport(status.to_string())
    } else {
        let excerpt = match details.char_indices().nth(BODY_EXCERPT_LEN) {
            Some((offset, _)) => &details[..offset],
            None => details,
        };
        ApiError::Transport(format!("{status}: {excerpt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_trims_and_truncates() {
        let err = status_error(StatusCode::BAD_GATEWAY, "  upstream exploded  ");
        assert_eq!(
            err,
            ApiError::Transport("502 Bad Gateway: upstream exploded".into())
        );

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, &"x".repeat(500));
        let ApiError::Transport(message) = err else {
            panic!("expected transport error");
        };
        assert!(message.len() < 300);
    }

    #[test]
    fn test_status_error_without_body() {
        let err = status_error(StatusCode::NOT_FOUND, "\n");
        assert_eq!(err, ApiError::Transport("404 Not Found".into()));
    }
}
