//! A client-side caching and resilience layer for a JSON HTTP API.
//!
//! The crate sits between consumers and a remote backend and keeps repeat
//! traffic off the wire:
//!
//! - successful reads land in a TTL-bounded [`caching::ResultCache`],
//! - concurrent identical requests are collapsed onto one network operation
//!   by the [`caching::InFlightRegistry`],
//! - a [`caching::HealthMonitor`] fails calls fast while the backend is
//!   struggling,
//! - [`with_retry`] re-issues failed reads with exponential backoff.
//!
//! [`ApiService`] wires these together; [`ResourceClient`] adds the
//! per-resource state (payload, loading and error flags, background refresh)
//! a typical consumer wants.

pub mod caching;
pub mod config;
pub mod error;
pub mod logging;
pub mod resource;
pub mod retry;
pub mod service;
pub mod transport;
mod utils;

pub use error::ApiError;
pub use resource::{AutoRefresh, ResourceClient};
pub use retry::{RetryPolicy, with_retry};
pub use service::ApiService;

/// A decoded response body, shared between the cache and all waiters.
pub type Payload = std::sync::Arc<serde_json::Value>;
