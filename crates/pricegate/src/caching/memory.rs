use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::Payload;
use crate::config::CacheConfig;

use super::CacheKey;

/// A payload stored together with the deadline at which it goes stale.
#[derive(Clone)]
struct CachedItem {
    deadline: Instant,
    payload: Payload,
}

/// In-memory store of successful read results.
///
/// Entries expire lazily: an entry past its deadline is treated as absent on
/// read (and evicted at that point), there is no background sweeper. The only
/// invalidation granularity besides single-entry expiry is [`clear_all`],
/// invoked after every successful mutation.
///
/// [`clear_all`]: ResultCache::clear_all
pub struct ResultCache {
    ttl: Duration,
    entries: moka::sync::Cache<CacheKey, CachedItem>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = moka::sync::Cache::builder()
            .max_capacity(config.max_capacity)
            .build();
        Self {
            ttl: config.ttl,
            entries,
        }
    }

    /// Returns the payload for `key` if a fresh entry exists.
    pub fn get(&self, key: &CacheKey) -> Option<Payload> {
        let item = self.entries.get(key)?;
        if Instant::now() >= item.deadline {
            tracing::trace!(%key, "evicting expired cache entry");
            self.entries.invalidate(key);
            return None;
        }
        Some(item.payload)
    }

    /// Stores `payload` under `key`, overwriting any prior entry.
    pub fn insert(&self, key: CacheKey, payload: Payload) {
        let deadline = Instant::now() + self.ttl;
        tracing::trace!(%key, "storing cache entry");
        self.entries.insert(key, CachedItem { deadline, payload });
    }

    /// Removes every entry. Invoked after successful mutations, since the
    /// engine does not track which reads a write affects.
    pub fn clear_all(&self) {
        tracing::debug!("clearing result cache");
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn cache(ttl: Duration) -> ResultCache {
        ResultCache::new(&CacheConfig {
            ttl,
            ..Default::default()
        })
    }

    fn key(path: &str) -> CacheKey {
        CacheKey::for_read(path, &[])
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = cache(Duration::from_secs(3600));
        let payload = Arc::new(json!({"price": 99}));

        cache.insert(key("plans"), payload.clone());
        assert_eq!(cache.get(&key("plans")), Some(payload.clone()));

        // One second short of the TTL the entry is still served.
        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get(&key("plans")), Some(payload));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&key("plans")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_overwrites_and_refreshes_deadline() {
        let cache = cache(Duration::from_secs(60));

        cache.insert(key("plans"), Arc::new(json!(1)));
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.insert(key("plans"), Arc::new(json!(2)));

        // The second insert reset the clock for this entry.
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get(&key("plans")), Some(Arc::new(json!(2))));
    }

    #[tokio::test]
    async fn test_clear_all_removes_every_entry() {
        let cache = cache(Duration::from_secs(3600));

        cache.insert(key("plans"), Arc::new(json!(1)));
        cache.insert(key("plugins/7"), Arc::new(json!(2)));

        cache.clear_all();

        assert_eq!(cache.get(&key("plans")), None);
        assert_eq!(cache.get(&key("plugins/7")), None);
    }
}
