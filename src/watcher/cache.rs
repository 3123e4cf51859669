use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const CACHE_EXPIRATION: Duration = Duration::from_secs(5 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(7 * 60);

/// Process-local TTL cache of lowercased address → known-wallet flag, kept
/// in front of the store so the watchers can screen chain events without a
/// database round-trip per log.
pub struct WalletCache {
    entries: RwLock<HashMap<String, (bool, Instant)>>,
    ttl: Duration,
}

impl WalletCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_EXPIRATION)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Periodic removal of expired entries.
    pub fn spawn_sweeper(self: Arc<Self>) {
        let cache = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tick.tick().await;
                let now = Instant::now();
                cache
                    .entries
                    .write()
                    .await
                    .retain(|_, (_, stored_at)| now.duration_since(*stored_at) < cache.ttl);
            }
        });
    }

    pub async fn get(&self, address: &str) -> Option<bool> {
        let entries = self.entries.read().await;
        let (known, stored_at) = entries.get(&address.to_lowercase())?;
        if stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(*known)
    }

    pub async fn set(&self, address: &str, known: bool) {
        self.entries
            .write()
            .await
            .insert(address.to_lowercase(), (known, Instant::now()));
    }

    /// Registration primes the cache so the next in-flight event sees the
    /// wallet immediately.
    pub async fn mark_known(&self, address: &str) {
        self.set(address, true).await;
    }
}

impl Default for WalletCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let cache = WalletCache::new();
        cache.mark_known("0xAAaa000000000000000000000000000000000001").await;
        assert_eq!(
            cache.get("0xaaAA000000000000000000000000000000000001").await,
            Some(true)
        );
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = WalletCache::with_ttl(Duration::from_millis(10));
        cache.set("0xabc", false).await;
        assert_eq!(cache.get("0xabc").await, Some(false));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("0xabc").await, None);
    }
}
