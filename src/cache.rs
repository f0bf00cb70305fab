use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// TTLs by query shape: per-principal daily stats barely change once the
/// day is over, cross-principal summaries and activity feeds churn faster.
pub const STATS_TTL: Duration = Duration::from_secs(3600);
pub const SUMMARY_TTL: Duration = Duration::from_secs(300);
pub const ACTIVITY_TTL: Duration = Duration::from_secs(120);

struct Entry {
    value: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

/// Short-lived memoization of aggregate reads. Expiry is checked lazily on
/// `get`; a periodic sweep additionally bounds memory. Constructed once at
/// process start and shared through `AppState`.
#[derive(Clone)]
pub struct AggregateCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if !entry.expired(Instant::now()) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop every key under a prefix. Used after a write so that all
    /// aggregates scoped to the written category or principal recompute on
    /// the next read.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "cache sweep");
        }
    }

    /// Background task evicting expired entries every `interval`.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }
}

impl Default for AggregateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn serves_value_before_ttl() {
        let cache = AggregateCache::new();
        cache
            .set("summary:morning", json!({"total": 3}), Duration::from_secs(60))
            .await;
        assert_eq!(
            cache.get("summary:morning").await,
            Some(json!({"total": 3}))
        );
    }

    #[tokio::test]
    async fn expires_lazily_on_read() {
        let cache = AggregateCache::new();
        cache
            .set("summary:morning", json!(1), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("summary:morning").await, None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let cache = AggregateCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.set("k", json!(2), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = AggregateCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_prefix_is_scoped() {
        let cache = AggregateCache::new();
        cache
            .set("summary:morning:", json!(1), Duration::from_secs(60))
            .await;
        cache
            .set("summary:evening:", json!(2), Duration::from_secs(60))
            .await;
        cache.invalidate_prefix("summary:morning").await;
        assert_eq!(cache.get("summary:morning:").await, None);
        assert_eq!(cache.get("summary:evening:").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired_entries() {
        let cache = AggregateCache::new();
        cache.set("old", json!(1), Duration::from_millis(10)).await;
        cache.set("new", json!(2), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.sweep().await;
        assert_eq!(cache.get("old").await, None);
        assert_eq!(cache.get("new").await, Some(json!(2)));
    }
}
