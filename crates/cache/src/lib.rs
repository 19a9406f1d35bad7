#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;

use async_trait::async_trait;
use attribution_core::types::AttributionReport;

pub use client::RedisCache;
pub use local::LocalCache;

/// Result cache keyed by `AttributionRequest::cache_key`.
///
/// Read-then-write only: a concurrent duplicate computation for the same key
/// simply overwrites an identical value.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<AttributionReport>>;

    async fn set(&self, key: &str, report: &AttributionReport, ttl_secs: u64)
        -> anyhow::Result<()>;
}
