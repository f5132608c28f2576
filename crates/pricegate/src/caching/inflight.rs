use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::{BoxFuture, Shared};

use crate::Payload;
use crate::error::ApiError;

use super::CacheKey;

/// A pending request that any number of callers can await.
///
/// All joiners observe the identical settlement, value or error.
pub type SharedOperation = Shared<BoxFuture<'static, Result<Payload, ApiError>>>;

/// Registry of requests currently on the wire, used for deduplication.
///
/// The coordinator's correctness hinges on the lookup and the registration of
/// an operation being atomic: two callers that both miss the registry would
/// each start a redundant network call. [`join_or_insert`] therefore performs
/// both steps under a single lock acquisition.
///
/// [`join_or_insert`]: InFlightRegistry::join_or_insert
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    operations: Mutex<HashMap<CacheKey, SharedOperation>>,
}

impl InFlightRegistry {
    /// Returns the pending operation for `key`, if one is on the wire.
    pub fn join(&self, key: &CacheKey) -> Option<SharedOperation> {
        self.operations.lock().unwrap().get(key).cloned()
    }

    /// Joins the pending operation for `key`, or registers the one produced
    /// by `create`.
    ///
    /// Returns the operation together with a flag indicating whether it was
    /// newly registered. `create` runs while the internal lock is held, so it
    /// must only construct the future, not poll or block on it.
    pub fn join_or_insert(
        &self,
        key: &CacheKey,
        create: impl FnOnce() -> SharedOperation,
    ) -> (SharedOperation, bool) {
        let mut operations = self.operations.lock().unwrap();
        if let Some(existing) = operations.get(key) {
            return (existing.clone(), false);
        }

        let operation = create();
        operations.insert(key.clone(), operation.clone());
        (operation, true)
    }

    /// Removes the registration for `key`.
    ///
    /// Invoked exactly once per operation when it settles, via a drop guard
    /// inside the operation itself, so not even a cancelled operation can
    /// leave a permanently stuck entry behind.
    pub fn release(&self, key: &CacheKey) {
        if self.operations.lock().unwrap().remove(key).is_none() {
            tracing::debug!(%key, "released an in-flight slot that was not registered");
        }
    }

    /// Number of requests currently on the wire.
    pub fn len(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn operation(value: i64) -> SharedOperation {
        async move { Ok(Arc::new(json!(value))) }.boxed().shared()
    }

    #[test]
    fn test_join_misses_on_empty_registry() {
        let registry = InFlightRegistry::default();
        let key = CacheKey::for_read("plans", &[]);

        assert!(registry.join(&key).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_second_caller_joins_the_first_operation() {
        let registry = InFlightRegistry::default();
        let key = CacheKey::for_read("plans", &[]);

        let (first, created) = registry.join_or_insert(&key, || operation(1));
        assert!(created);

        // The second closure must not run; the first operation wins.
        let (second, created) = registry.join_or_insert(&key, || unreachable!());
        assert!(!created);

        assert_eq!(registry.len(), 1);
        assert_eq!(first.await.unwrap(), second.await.unwrap());
    }

    #[tokio::test]
    async fn test_release_frees_the_slot() {
        let registry = InFlightRegistry::default();
        let key = CacheKey::for_read("plans", &[]);

        registry.join_or_insert(&key, || operation(1));
        registry.release(&key);

        assert!(registry.join(&key).is_none());

        // Releasing again is a no-op.
        registry.release(&key);
    }
}
