//! Cache Layer for serialized recommendation results.
//!
//! One entry per (user, family), bounded by a TTL and deleted eagerly when
//! the user records a new interaction. A live entry is always served as is;
//! nothing refreshes entries in the background.

use crate::error::Result;
use async_trait::async_trait;
use models::Family;
use redis::AsyncCommands;
use redis::Client;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendations { user_id: String, family: Family },
}

impl CacheKey {
    pub fn recommendations(user_id: &str, family: Family) -> Self {
        CacheKey::Recommendations {
            user_id: user_id.to_string(),
            family,
        }
    }

    /// Keys of every family for one user
    pub fn all_for_user(user_id: &str) -> Vec<CacheKey> {
        Family::ALL
            .iter()
            .map(|&family| CacheKey::recommendations(user_id, family))
            .collect()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations { user_id, family } => {
                write!(f, "recommendations:{}:{}", user_id, family)
            }
        }
    }
}

#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, user_id: &str, family: Family) -> Result<Option<String>>;

    async fn put(&self, user_id: &str, family: Family, value: String, ttl: Duration)
        -> Result<()>;

    /// Drop the entries of every family for `user_id`
    async fn invalidate(&self, user_id: &str) -> Result<()>;
}

/// In-process cache with TTL expiry on read
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }
}

#[async_trait]
impl RecommendationCache for MemoryCache {
    async fn get(&self, user_id: &str, family: Family) -> Result<Option<String>> {
        let key = CacheKey::recommendations(user_id, family).to_string();
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let live = entries
            .get(&key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone());
        if live.is_none() {
            entries.remove(&key);
        }
        Ok(live)
    }

    async fn put(
        &self,
        user_id: &str,
        family: Family,
        value: String,
        ttl: Duration,
    ) -> Result<()> {
        let key = CacheKey::recommendations(user_id, family).to_string();
        self.entries
            .lock()
            .await
            .insert(key, (value, Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in CacheKey::all_for_user(user_id) {
            entries.remove(&key.to_string());
        }
        Ok(())
    }
}

/// Creates a Redis client for the recommendation cache
pub fn create_redis_client(redis_url: &str) -> Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// Cache backed by Redis string keys with `SETEX` expiry
#[derive(Clone)]
pub struct RedisCache {
    redis_client: Client,
}

impl RedisCache {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait]
impl RecommendationCache for RedisCache {
    async fn get(&self, user_id: &str, family: Family) -> Result<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn
            .get(CacheKey::recommendations(user_id, family).to_string())
            .await?;
        Ok(cached)
    }

    async fn put(
        &self,
        user_id: &str,
        family: Family,
        value: String,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = CacheKey::recommendations(user_id, family).to_string();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = CacheKey::all_for_user(user_id)
            .iter()
            .map(ToString::to_string)
            .collect();
        let _: () = conn.del(keys).await?;
        debug!("Invalidated cached recommendations for user {}", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::recommendations("42", Family::Als);
        assert_eq!(key.to_string(), "recommendations:42:als");
        let key = CacheKey::recommendations("42", Family::LightFm);
        assert_eq!(format!("{}", key), "recommendations:42:lightfm");
    }

    #[tokio::test]
    async fn test_memory_put_get_invalidate() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(3600);
        cache.put("u1", Family::Als, "a".into(), ttl).await.unwrap();
        cache.put("u1", Family::LightFm, "b".into(), ttl).await.unwrap();
        cache.put("u2", Family::Als, "c".into(), ttl).await.unwrap();

        assert_eq!(cache.get("u1", Family::Als).await.unwrap().as_deref(), Some("a"));
        cache.invalidate("u1").await.unwrap();
        assert!(cache.get("u1", Family::Als).await.unwrap().is_none());
        assert!(cache.get("u1", Family::LightFm).await.unwrap().is_none());
        assert_eq!(cache.get("u2", Family::Als).await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .put("u1", Family::Als, "a".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("u1", Family::Als).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("u1", Family::Als).await.unwrap().is_none());
        assert_eq!(cache.len().await, 0);
    }
}
