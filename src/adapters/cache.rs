use crate::domain::ports::CacheStore;
use crate::utils::error::{PmsError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// glob (`*`) 轉成錨定的正規表達式
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{}$", escaped)).map_err(|e| PmsError::CacheError {
        message: format!("Invalid key pattern '{}': {}", pattern, e),
    })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// 單一行程用的快取；過期項目在讀取時清除
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // 已過期
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let re = glob_to_regex(pattern)?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !re.is_match(key));
        Ok(before - entries.len())
    }
}

/// 依設定建立快取後端；`redis` 需要編譯時開啟同名 feature
pub async fn connect_cache_store(backend: &str, url: Option<&str>) -> Result<Arc<dyn CacheStore>> {
    match backend {
        "memory" => Ok(Arc::new(MemoryCache::new())),
        #[cfg(feature = "redis")]
        "redis" => {
            let url = url.ok_or_else(|| PmsError::MissingConfigError {
                field: "cache.url".to_string(),
            })?;
            Ok(Arc::new(RedisCache::connect(url).await?))
        }
        other => {
            let _ = url;
            Err(PmsError::InvalidConfigValueError {
                field: "cache.backend".to_string(),
                value: other.to_string(),
                reason: "Unsupported cache backend for this build".to_string(),
            })
        }
    }
}

#[cfg(feature = "redis")]
pub use redis_store::RedisCache;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use redis::aio::{ConnectionManager, ConnectionManagerConfig};
    use redis::AsyncCommands;

    fn cache_error(e: redis::RedisError) -> PmsError {
        PmsError::CacheError {
            message: e.to_string(),
        }
    }

    /// Redis 後端，ConnectionManager 斷線時自動重連
    #[derive(Clone)]
    pub struct RedisCache {
        connection: ConnectionManager,
    }

    impl RedisCache {
        pub async fn connect(redis_url: &str) -> Result<Self> {
            let config = ConnectionManagerConfig::new()
                .set_number_of_retries(1)
                .set_connection_timeout(Some(Duration::from_millis(500)));

            let client = redis::Client::open(redis_url).map_err(cache_error)?;
            let connection = client
                .get_connection_manager_with_config(config)
                .await
                .map_err(cache_error)?;

            tracing::info!("🔌 Connected to Redis cache");
            Ok(Self { connection })
        }
    }

    #[async_trait::async_trait]
    impl CacheStore for RedisCache {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let mut conn = self.connection.clone();
            let value: Option<String> = conn.get(key).await.map_err(cache_error)?;
            Ok(value)
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            let mut conn = self.connection.clone();
            let seconds = ttl.as_secs().max(1);
            let _: () = conn.set_ex(key, value, seconds).await.map_err(cache_error)?;
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            let mut conn = self.connection.clone();
            let removed: usize = conn.del(key).await.map_err(cache_error)?;
            Ok(removed > 0)
        }

        async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
            let mut conn = self.connection.clone();
            let mut cursor: u64 = 0;
            let mut removed = 0;

            // SCAN 逐批處理，避免 KEYS 阻塞伺服器
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(200)
                    .query_async(&mut conn)
                    .await
                    .map_err(cache_error)?;

                if !keys.is_empty() {
                    let count: usize = conn.del(&keys).await.map_err(cache_error)?;
                    removed += count;
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }

            Ok(removed)
        }
    }
}
