//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Serves standalone, or as L1 in front of Redis to skip network round trips.

use async_trait::async_trait;
use attribution_core::types::AttributionReport;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ResultCache;

struct CacheEntry {
    report: AttributionReport,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Lock-free local cache for computed attribution reports.
pub struct LocalCache {
    store: Arc<DashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl LocalCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Get a report, returns None if expired or missing.
    pub fn get_report(&self, key: &str) -> Option<AttributionReport> {
        let entry = self.store.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(entry.report.clone())
    }

    /// Insert or replace a report with its own TTL.
    pub fn put_report(&self, key: String, report: AttributionReport, ttl: Duration) {
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            self.evict_expired();
            // Still full of live entries: skip the insert.
            if self.store.len() >= self.max_entries {
                return;
            }
        }
        self.store.insert(
            key,
            CacheEntry {
                report,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove expired entries.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.store.len())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl ResultCache for LocalCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<AttributionReport>> {
        Ok(self.get_report(key))
    }

    async fn set(
        &self,
        key: &str,
        report: &AttributionReport,
        ttl_secs: u64,
    ) -> anyhow::Result<()> {
        self.put_report(key.to_string(), report.clone(), Duration::from_secs(ttl_secs));
        Ok(())
    }
}
