//! Redis cache client for computed attribution reports.
//! Two-tier caching: LocalCache (L1) -> Redis (L2).

use crate::local::LocalCache;
use crate::ResultCache;
use async_trait::async_trait;
use attribution_core::config::RedisConfig;
use attribution_core::types::AttributionReport;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed distributed cache with local L1 layer.
pub struct RedisCache {
    client: redis::Client,
    local: Arc<LocalCache>,
}

impl RedisCache {
    /// Connect to Redis and verify the connection.
    pub async fn new(config: &RedisConfig, local_max_entries: usize) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;

        let mut conn = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            client.get_multiplexed_async_connection(),
        )
        .await??;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            local: Arc::new(LocalCache::new(local_max_entries)),
        })
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    /// Checks L1 local cache first, then Redis.
    async fn get(&self, key: &str) -> anyhow::Result<Option<AttributionReport>> {
        if let Some(report) = self.local.get_report(key) {
            metrics::counter!("attribution.cache.l1.hit").increment(1);
            return Ok(Some(report));
        }
        metrics::counter!("attribution.cache.l1.miss").increment(1);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let data: Option<String> = conn.get(key).await?;

        match data {
            Some(json) => {
                let report: AttributionReport = serde_json::from_str(&json)?;
                let ttl: i64 = conn.ttl(key).await?;
                // L1 keeps at most half the remaining L2 lifetime.
                if ttl > 0 {
                    let l1_ttl = Duration::from_secs((ttl as u64) / 2);
                    self.local.put_report(key.to_string(), report.clone(), l1_ttl);
                }
                metrics::counter!("attribution.cache.l2.hit").increment(1);
                Ok(Some(report))
            }
            None => {
                metrics::counter!("attribution.cache.l2.miss").increment(1);
                debug!(key = key, "Cache miss for attribution report");
                Ok(None)
            }
        }
    }

    /// Store a report in both L1 and L2.
    async fn set(
        &self,
        key: &str,
        report: &AttributionReport,
        ttl_secs: u64,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(report)?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, &json, ttl_secs).await?;

        self.local.put_report(
            key.to_string(),
            report.clone(),
            Duration::from_secs(ttl_secs / 2),
        );

        Ok(())
    }
}
