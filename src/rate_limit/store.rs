use crate::config::Config;
use crate::errors::Result;
use crate::rate_limit::bucket::Bucket;
use crate::redis::{RedisBucketStore, RedisConnector};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Key to bucket persistence shared by the gate.
///
/// `get` returns `Ok(None)` for unknown keys and for records that cannot be
/// parsed. `Err` is reserved for backend failures (connectivity, timeouts).
#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bucket>>;

    async fn set(&self, key: &str, bucket: &Bucket) -> Result<()>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Short backend label used in logs and metrics
    fn backend(&self) -> &'static str;
}

/// In-process store for single-instance deployments.
///
/// Stale buckets are never swept; they are overwritten once their window
/// lapses.
#[derive(Debug, Default)]
pub struct LocalStore {
    buckets: DashMap<String, Bucket>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl BucketStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Bucket>> {
        Ok(self.buckets.get(key).map(|entry| *entry.value()))
    }

    async fn set(&self, key: &str, bucket: &Bucket) -> Result<()> {
        self.buckets.insert(key.to_string(), *bucket);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// Pick the store once at startup: Redis when a URL is configured, memory otherwise
pub fn build_store(config: &Config) -> Result<Arc<dyn BucketStore>> {
    match &config.redis {
        Some(redis) => {
            let connector = RedisConnector::new(redis)?;
            let store = RedisBucketStore::new(connector, redis, &config.rate_limit);
            tracing::info!(
                prefix = %config.rate_limit.key_prefix,
                ttl_seconds = store.ttl_seconds(),
                "Using Redis rate limit store"
            );
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("Using in-process rate limit store");
            Ok(Arc::new(LocalStore::new()))
        }
    }
}
