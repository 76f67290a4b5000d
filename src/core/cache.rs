use crate::domain::model::TenantId;
use crate::domain::ports::CacheStore;
use crate::utils::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Cache-aside：先讀快取，未命中時由 loader 讀取並回填。
///
/// 快取後端故障時直接走 loader（fail open），只記錄錯誤次數；
/// loader 失敗則原樣回傳錯誤，不寫入快取。
pub struct CacheAside<C: CacheStore + ?Sized = dyn CacheStore> {
    store: Arc<C>,
    prefix: String,
    default_ttl: Duration,
    counters: Counters,
}

impl<C: CacheStore + ?Sized> CacheAside<C> {
    pub fn new(store: Arc<C>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
            counters: Counters::default(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// `{prefix}:{tenant}:{namespace}:{parts...}`
    pub fn key(&self, tenant: &TenantId, namespace: &str, parts: &[&str]) -> String {
        let mut key = format!("{}:{}:{}", self.prefix, tenant, namespace);
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let value = loader().await?;
        self.put(key, &value, ttl).await;
        Ok(value)
    }

    /// 讀取並反序列化；壞掉的內容會被刪除並視為未命中
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("🎯 Cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("🗑️ Dropping undecodable cache entry {}: {}", key, e);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.store.delete(key).await {
                        self.record_error("delete", key, &e.to_string());
                    }
                    None
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("💨 Cache miss: {}", key);
                None
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.record_error("get", key, &e.to_string());
                None
            }
        }
    }

    /// 寫入快取；失敗只記錄，不影響呼叫端
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.record_error("encode", key, &e.to_string());
                return false;
            }
        };

        match self.store.set(key, &payload, ttl.unwrap_or(self.default_ttl)).await {
            Ok(()) => true,
            Err(e) => {
                self.record_error("set", key, &e.to_string());
                false
            }
        }
    }

    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    pub async fn invalidate_namespace(&self, tenant: &TenantId, namespace: &str) -> Result<usize> {
        let pattern = format!("{}:{}:{}:*", self.prefix, tenant, namespace);
        let removed = self.store.delete_pattern(&pattern).await?;
        tracing::info!("🧹 Invalidated {} cache entries matching {}", removed, pattern);
        Ok(removed)
    }

    pub async fn invalidate_tenant(&self, tenant: &TenantId) -> Result<usize> {
        let pattern = format!("{}:{}:*", self.prefix, tenant);
        let removed = self.store.delete_pattern(&pattern).await?;
        tracing::info!("🧹 Invalidated {} cache entries for tenant {}", removed, tenant);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self, operation: &str, key: &str, message: &str) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("⚠️ Cache {} failed for {}: {}", operation, key, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cache::MemoryCache;
    use crate::utils::error::PmsError;
    use std::sync::atomic::AtomicUsize;

    /// 所有操作都失敗的後端
    struct BrokenStore;

    #[async_trait::async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(PmsError::CacheError {
                message: "connection refused".to_string(),
            })
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(PmsError::CacheError {
                message: "connection refused".to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }

        async fn delete_pattern(&self, _pattern: &str) -> Result<usize> {
            Ok(0)
        }
    }

    fn tenant() -> TenantId {
        TenantId::new("hotel-a")
    }

    #[test]
    fn test_key_layout() {
        let cache = CacheAside::new(Arc::new(MemoryCache::new()), "pms", Duration::from_secs(60));
        assert_eq!(cache.key(&tenant(), "views", &["daily_occupancy"]), "pms:hotel-a:views:daily_occupancy");
        assert_eq!(cache.key(&tenant(), "rooms", &[]), "pms:hotel-a:rooms");
    }

    #[tokio::test]
    async fn test_loader_runs_once() {
        let cache = CacheAside::new(Arc::new(MemoryCache::new()), "pms", Duration::from_secs(60));
        let loads = AtomicUsize::new(0);
        let key = cache.key(&tenant(), "rooms", &["count"]);

        for _ in 0..3 {
            let value: u32 = cache
                .get_or_load(&key, None, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_loader() {
        let cache = CacheAside::new(Arc::new(BrokenStore), "pms", Duration::from_secs(60));

        let value: String = cache
            .get_or_load("pms:hotel-a:guests:g1", None, || async { Ok("Ada".to_string()) })
            .await
            .unwrap();

        assert_eq!(value, "Ada");
        assert_eq!(cache.stats().errors, 2); // get + set
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let store = Arc::new(MemoryCache::new());
        let cache = CacheAside::new(store.clone(), "pms", Duration::from_secs(60));

        let result: Result<u32> = cache
            .get_or_load("pms:hotel-a:rooms:count", None, || async {
                Err(PmsError::ProcessingError {
                    message: "api down".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_replaced() {
        let store = Arc::new(MemoryCache::new());
        store
            .set("pms:hotel-a:rooms:count", "not-a-number", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = CacheAside::new(store.clone(), "pms", Duration::from_secs(60));

        let value: u32 = cache
            .get_or_load("pms:hotel-a:rooms:count", None, || async { Ok(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(store.get("pms:hotel-a:rooms:count").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_invalidate_namespace_keeps_other_tenants() {
        let store = Arc::new(MemoryCache::new());
        let cache = CacheAside::new(store.clone(), "pms", Duration::from_secs(60));
        let other = TenantId::new("hotel-b");

        cache.put(&cache.key(&tenant(), "views", &["a"]), &1, None).await;
        cache.put(&cache.key(&tenant(), "views", &["b"]), &2, None).await;
        cache.put(&cache.key(&other, "views", &["a"]), &3, None).await;

        assert_eq!(cache.invalidate_namespace(&tenant(), "views").await.unwrap(), 2);
        assert_eq!(cache.get::<u32>(&cache.key(&other, "views", &["a"])).await, Some(3));
        assert_eq!(cache.invalidate_tenant(&other).await.unwrap(), 1);
    }
}
