//! Bounded-TTL key-value store backing verification codes, resend cooldowns,
//! attempt counters, and rate buckets.
//!
//! The trait is the seam for external backends (`KV_URL`); the in-process
//! implementation is the default and is also what the tests run against.
//! Callers treat any error as a transient failure and fail closed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Opaque-value key-value store with per-key TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value at `key` if it exists and has not expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `value`, replacing any prior entry and TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Atomically increment the counter at `key`, creating it with
    /// `ttl_if_new` on first write, and return the post-increment value.
    async fn incr(&self, key: &str, ttl_if_new: Duration) -> Result<i64>;

    /// Remaining lifetime of `key`, or `None` if absent/expired.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process store. A single mutex makes `incr` trivially atomic; expired
/// entries are pruned lazily on access.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.live(now));
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_if_new: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.live(now));

        let (count, expires_at) = match entries.get(key) {
            Some(entry) => {
                let current: i64 = std::str::from_utf8(&entry.value)
                    .context("counter is not valid utf-8")?
                    .parse()
                    .context("counter is not an integer")?;
                (current + 1, entry.expires_at)
            }
            None => (1, now + ttl_if_new),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_get_del_round_trip() -> Result<()> {
        let store = MemoryKvStore::new();
        store.set("k", b"v", Duration::from_secs(60)).await?;
        assert_eq!(store.get("k").await?, Some(b"v".to_vec()));
        store.del("k").await?;
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn expired_entries_are_gone() -> Result<()> {
        let store = MemoryKvStore::new();
        store.set("k", b"v", Duration::from_millis(10)).await?;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await?, None);
        assert_eq!(store.ttl("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn set_replaces_value_and_ttl() -> Result<()> {
        let store = MemoryKvStore::new();
        store.set("k", b"old", Duration::from_millis(10)).await?;
        store.set("k", b"new", Duration::from_secs(60)).await?;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await?, Some(b"new".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn incr_creates_with_ttl_and_counts() -> Result<()> {
        let store = MemoryKvStore::new();
        assert_eq!(store.incr("c", Duration::from_secs(60)).await?, 1);
        assert_eq!(store.incr("c", Duration::from_secs(60)).await?, 2);
        assert_eq!(store.incr("c", Duration::from_secs(60)).await?, 3);
        let ttl = store.ttl("c").await?.expect("ttl present");
        assert!(ttl <= Duration::from_secs(60));
        Ok(())
    }

    #[tokio::test]
    async fn incr_ttl_is_not_extended_by_later_increments() -> Result<()> {
        let store = MemoryKvStore::new();
        store.incr("c", Duration::from_millis(50)).await?;
        store.incr("c", Duration::from_secs(60)).await?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        // Window elapsed; the counter restarts.
        assert_eq!(store.incr("c", Duration::from_secs(60)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn parallel_increments_do_not_lose_updates() -> Result<()> {
        let store = Arc::new(MemoryKvStore::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.incr("c", Duration::from_secs(60)).await
            }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.expect("join")?);
        }
        results.sort_unstable();
        assert_eq!(results, (1..=10).collect::<Vec<i64>>());
        Ok(())
    }
}
