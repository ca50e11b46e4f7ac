// Rate limit buckets stored as JSON strings with a per-write expiry

use crate::config::{RateLimitConfig, RedisConfig};
use crate::errors::{AppError, Result};
use crate::rate_limit::{Bucket, BucketStore};
use crate::redis::client::RedisConnector;
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;

/// Extra lifetime on top of window + block so a key outlives any state it can hold
pub const TTL_MARGIN_SECONDS: u64 = 600;

/// Expiry applied to every write: the override if set, else `window + block + margin`
pub fn ttl_seconds(config: &RateLimitConfig) -> u64 {
    if let Some(ttl) = config.ttl_seconds {
        return ttl;
    }
    let active_ms = config.window_ms.max(0) as u64 + config.block_ms.max(0) as u64;
    active_ms.div_ceil(1000) + TTL_MARGIN_SECONDS
}

/// Redis-backed bucket store shared by every server instance
pub struct RedisBucketStore {
    connector: RedisConnector,
    prefix: String,
    ttl_seconds: u64,
    command_timeout: Duration,
}

impl RedisBucketStore {
    pub fn new(connector: RedisConnector, redis: &RedisConfig, limits: &RateLimitConfig) -> Self {
        Self {
            connector,
            prefix: limits.key_prefix.clone(),
            ttl_seconds: ttl_seconds(limits),
            command_timeout: Duration::from_millis(redis.command_timeout_ms),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// `rate:` + `login:1.2.3.4`
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Bound a command by the timeout; connection-level failures drop the
    /// cached connection
    async fn timed<T>(&self, command: impl Future<Output = RedisResult<T>>) -> Result<T> {
        let result = match tokio::time::timeout(self.command_timeout, command).await {
            Ok(reply) => reply.map_err(AppError::from),
            Err(_) => Err(AppError::BackendTimeout(
                self.command_timeout.as_millis() as u64,
            )),
        };
        if let Err(error) = &result {
            self.connector.report_failure(error);
        }
        result
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn get(&self, key: &str) -> Result<Option<Bucket>> {
        let redis_key = self.redis_key(key);
        let mut manager = self.connector.connection().await?;

        let raw: Option<Vec<u8>> = self.timed(manager.get(&redis_key)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let bucket = std::str::from_utf8(&raw).ok().and_then(Bucket::decode);
        if bucket.is_none() {
            tracing::warn!(key = %redis_key, "Discarding malformed rate limit record");
        }
        Ok(bucket)
    }

    async fn set(&self, key: &str, bucket: &Bucket) -> Result<()> {
        let redis_key = self.redis_key(key);
        let payload = bucket.encode()?;
        let mut manager = self.connector.connection().await?;

        self.timed(manager.set_ex::<_, _, ()>(&redis_key, payload, self.ttl_seconds))
            .await?;

        tracing::trace!(key = %redis_key, count = bucket.count, "Rate limit bucket stored");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.connector.health_check().await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
