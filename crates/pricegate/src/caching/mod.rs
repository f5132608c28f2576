//! The stateful building blocks of the fetch engine.
//!
//! [`ResultCache`], [`InFlightRegistry`] and [`HealthMonitor`] are process-wide
//! singletons owned by the [`ApiService`](crate::ApiService); they never
//! interact with each other directly, the coordinator sequences them.

mod cache_key;
mod health;
mod inflight;
mod memory;

pub use cache_key::CacheKey;
pub use health::{HealthMonitor, HealthSnapshot};
pub use inflight::{InFlightRegistry, SharedOperation};
pub use memory::ResultCache;
