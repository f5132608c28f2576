use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::Payload;
use crate::caching::{
    CacheKey, HealthMonitor, HealthSnapshot, InFlightRegistry, ResultCache, SharedOperation,
};
use crate::config::Config;
use crate::error::ApiError;
use crate::transport::{ApiRequest, Method, Transport};
use crate::utils::CallOnDrop;

/// What to do with the result cache once a request succeeds.
#[derive(Clone, Copy)]
enum WriteBack {
    /// Store the payload under the request's key (reads).
    Store,
    /// Drop the entire read cache (mutations).
    Invalidate,
}

/// The central fetch coordinator.
///
/// Construct one instance at application start and hand the [`Arc`] to every
/// consumer; the cache, the in-flight registry and the circuit breaker are
/// deliberately not reachable as globals.
///
/// For any number of concurrent callers requesting the same logical resource,
/// the service issues at most one network call: the first caller registers a
/// shared operation, everyone else joins it and observes the identical
/// settlement. Successful reads are cached for the configured TTL; any
/// successful mutation clears the whole read cache, the engine does not track
/// per-resource invalidation. A failure opens the [`HealthMonitor`] breaker,
/// and while it is open both reads and writes fail fast with
/// [`ApiError::Blocked`] without touching the network.
pub struct ApiService {
    transport: Arc<dyn Transport>,
    cache: ResultCache,
    inflight: InFlightRegistry,
    health: HealthMonitor,
}

impl std::fmt::Debug for ApiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService")
            .field("cache", &self.cache)
            .field("in_flight", &self.inflight.len())
            .field("health", &self.health.snapshot())
            .finish()
    }
}

impl ApiService {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            cache: ResultCache::new(&config.cache),
            inflight: InFlightRegistry::default(),
            health: HealthMonitor::new(&config.health),
        })
    }

    /// Fetches a resource, going to the network only when necessary.
    ///
    /// The fast paths, in order: a fresh cached payload (unless
    /// `force_refresh`), then an in-flight request for the same key. A forced
    /// refresh skips the cache but still joins an existing in-flight request
    /// rather than stacking a second call onto an already inbound response,
    /// and still registers itself so later callers can join it.
    pub async fn fetch(
        self: &Arc<Self>,
        path: &str,
        params: &[(&str, &str)],
        force_refresh: bool,
    ) -> Result<Payload, ApiError> {
        let key = CacheKey::for_read(path, params);
        self.ensure_available()?;

        if !force_refresh {
            if let Some(payload) = self.cache.get(&key) {
                tracing::trace!(%key, path, "serving cached payload");
                return Ok(payload);
            }
        }

        let query = params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let request = ApiRequest::get(path, query);

        let (operation, created) = self
            .inflight
            .join_or_insert(&key, || self.begin(key.clone(), request, WriteBack::Store));
        if !created {
            tracing::trace!(%key, path, "joining in-flight request");
        }
        operation.await
    }

    /// Issues a mutation against the backend.
    ///
    /// Identical mutations (same method, path and body) issued while one is
    /// on the wire collapse into a single request, which keeps rapid
    /// double-submits harmless. On success the entire read cache is cleared;
    /// on failure it is left untouched.
    pub async fn mutate(
        self: &Arc<Self>,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Payload, ApiError> {
        debug_assert!(method != Method::Get, "mutations must not use GET");

        let key = CacheKey::for_write(method, path, body.as_ref());
        self.ensure_available()?;

        let request = ApiRequest::write(method, path, body);
        let (operation, created) = self.inflight.join_or_insert(&key, || {
            self.begin(key.clone(), request, WriteBack::Invalidate)
        });
        if !created {
            tracing::debug!(%key, path, "joining identical in-flight mutation");
        }
        operation.await
    }

    /// Starts the actual network operation for `request`.
    ///
    /// The operation runs on its own task: once started it runs to
    /// completion even if every interested caller gives up, matching the
    /// no-cancellation contract. It releases its in-flight slot when it
    /// settles, via a drop guard, so not even a panic in settlement handling
    /// can leave a stuck registration behind.
    fn begin(self: &Arc<Self>, key: CacheKey, request: ApiRequest, write_back: WriteBack) -> SharedOperation {
        let service = Arc::clone(self);

        let task = tokio::spawn(async move {
            let _release = CallOnDrop::new({
                let service = Arc::clone(&service);
                let key = key.clone();
                move || service.inflight.release(&key)
            });

            match service.transport.send(request).await {
                Ok(value) => {
                    let payload = Payload::new(value);
                    service.health.record_success();
                    match write_back {
                        WriteBack::Store => service.cache.insert(key, payload.clone()),
                        WriteBack::Invalidate => service.cache.clear_all(),
                    }
                    Ok(payload)
                }
                Err(error) => {
                    service.health.record_failure();
                    tracing::debug!(%key, %error, "api request failed");
                    Err(error)
                }
            }
        });

        let future = async move {
            task.await
                .unwrap_or_else(|error| Err(ApiError::Transport(format!("request task failed: {error}"))))
        };
        future.boxed().shared()
    }

    fn ensure_available(&self) -> Result<(), ApiError> {
        match self.health.retry_after() {
            None => Ok(()),
            Some(retry_after) => Err(ApiError::Blocked(retry_after)),
        }
    }

    /// Whether the circuit breaker currently admits requests.
    pub fn is_available(&self) -> bool {
        self.health.is_available()
    }

    /// Read-only view of the circuit breaker, for observability.
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Manually closes the circuit breaker.
    pub fn reset_health(&self) {
        self.health.reset();
    }

    /// Manually drops every cached read result.
    pub fn clear_cache(&self) {
        self.cache.clear_all();
    }

    /// Number of requests currently on the wire.
    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }
}
