use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::Payload;
use crate::error::ApiError;
use crate::retry::{RetryPolicy, with_retry};
use crate::service::ApiService;
use crate::transport::Method;
use crate::utils::CallOnDrop;

#[derive(Default)]
struct ResourceState {
    data: Option<Payload>,
    error: Option<ApiError>,
    last_error: Option<ApiError>,
    has_errored: bool,
    loading: usize,
    last_fetch: Option<Instant>,
}

/// Consumer-facing handle for one logical resource.
///
/// Wraps the [`ApiService`] with the state a typical consumer wants to poll:
/// the last payload, a loading flag and the error status. Reads go through
/// the configured [`RetryPolicy`]; mutations are issued once and never
/// retried automatically. Many handles for the same resource can exist
/// at once, they all funnel into the same service and therefore share cache
/// entries and in-flight requests.
pub struct ResourceClient {
    service: Arc<ApiService>,
    path: String,
    params: Vec<(String, String)>,
    retry: RetryPolicy,
    state: Mutex<ResourceState>,
}

impl ResourceClient {
    pub fn new(service: Arc<ApiService>, path: impl Into<String>) -> Self {
        Self {
            service,
            path: path.into(),
            params: Vec::new(),
            retry: RetryPolicy::default(),
            state: Mutex::new(ResourceState::default()),
        }
    }

    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params = params
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn service(&self) -> &Arc<ApiService> {
        &self.service
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the current payload, fetching it first if none is held yet.
    pub async fn load(&self) -> Result<Payload, ApiError> {
        if let Some(data) = self.data() {
            return Ok(data);
        }
        self.refetch(false).await
    }

    /// Fetches the resource, retrying per the policy, and records the outcome.
    pub async fn refetch(&self, force_refresh: bool) -> Result<Payload, ApiError> {
        self.begin_call();
        let _loading = CallOnDrop::new(|| self.end_call());

        let params = self.params_ref();
        let result = with_retry(self.retry, || {
            self.service.fetch(&self.path, &params, force_refresh)
        })
        .await;

        self.record(&result, true);
        result
    }

    /// POSTs a new resource.
    pub async fn create(&self, body: Value) -> Result<Payload, ApiError> {
        self.mutate(Method::Post, Some(body)).await
    }

    /// PUTs an update to the resource.
    pub async fn update(&self, body: Value) -> Result<Payload, ApiError> {
        self.mutate(Method::Put, Some(body)).await
    }

    /// DELETEs the resource.
    pub async fn delete(&self) -> Result<Payload, ApiError> {
        self.mutate(Method::Delete, None).await
    }

    async fn mutate(&self, method: Method, body: Option<Value>) -> Result<Payload, ApiError> {
        self.begin_call();
        let _loading = CallOnDrop::new(|| self.end_call());

        let result = self.service.mutate(method, &self.path, body).await;

        self.record(&result, false);
        result
    }

    /// The payload of the last successful read.
    ///
    /// This is intentionally not cleared when a refresh starts: consumers keep
    /// showing the stale value until the new one arrives.
    pub fn data(&self) -> Option<Payload> {
        self.state.lock().unwrap().data.clone()
    }

    /// The current error, if the last call failed and was not cleared since.
    pub fn error(&self) -> Option<ApiError> {
        self.state.lock().unwrap().error.clone()
    }

    /// The most recent error; persists until the next failure replaces it.
    pub fn last_error(&self) -> Option<ApiError> {
        self.state.lock().unwrap().last_error.clone()
    }

    pub fn has_errored(&self) -> bool {
        self.state.lock().unwrap().has_errored
    }

    /// Whether any call through this handle is currently running.
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading > 0
    }

    /// When the last successful call through this handle settled.
    pub fn last_fetch(&self) -> Option<Instant> {
        self.state.lock().unwrap().last_fetch
    }

    /// Clears the current error state; the last error is kept for inspection.
    pub fn clear_error(&self) {
        let mut state = self.state.lock().unwrap();
        state.error = None;
        state.has_errored = false;
    }

    /// Spawns a background task that force-refreshes the resource on a fixed
    /// interval.
    ///
    /// A round is skipped while a call is already running, while the error
    /// state is unresolved, or while the circuit breaker is open. The returned
    /// guard cancels the task when dropped, so a discarded consumer cannot
    /// leak scheduled work.
    pub fn auto_refresh(self: &Arc<Self>, interval: Duration) -> AutoRefresh {
        let client = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consumers load on their own.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if client.is_loading() || client.has_errored() || !client.service.is_available() {
                    continue;
                }
                if let Err(error) = client.refetch(true).await {
                    tracing::debug!(path = %client.path, %error, "background refresh failed");
                }
            }
        });

        AutoRefresh { handle }
    }

    fn params_ref(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    fn begin_call(&self) {
        let mut state = self.state.lock().unwrap();
        state.loading += 1;
        // Starting a fresh call clears the current error but keeps the last
        // one around for inspection.
        state.error = None;
    }

    fn end_call(&self) {
        self.state.lock().unwrap().loading -= 1;
    }

    fn record(&self, result: &Result<Payload, ApiError>, is_read: bool) {
        let mut state = self.state.lock().unwrap();
        match result {
            Ok(payload) => {
                if is_read {
                    state.data = Some(payload.clone());
                }
                state.error = None;
                state.has_errored = false;
                state.last_fetch = Some(Instant::now());
            }
            Err(error) => {
                state.error = Some(error.clone());
                state.last_error = Some(error.clone());
                state.has_errored = true;
            }
        }
    }
}

/// Guard for a background refresh task; aborts the task on drop.
pub struct AutoRefresh {
    handle: JoinHandle<()>,
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
