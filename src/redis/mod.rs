pub mod bucket_store;
pub mod client;

pub use bucket_store::{ttl_seconds, RedisBucketStore, TTL_MARGIN_SECONDS};
pub use client::{ReconnectBackoff, RedisConnector};
