//! The attribution pipeline: cache lookup, concurrent signal collection,
//! hierarchy resolution, and report assembly.

use attribution_analytics::{collect_signals, CollectedSignals, SignalSource};
use attribution_cache::ResultCache;
use attribution_core::config::AttributionSettings;
use attribution_core::types::{AttributionReport, AttributionRequest};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::hierarchy::SignalHierarchyResolver;
use crate::quality::DataQualityAssessor;
use crate::summary::build_summary;
use crate::timeseries::build_time_series;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Computes attribution reports; always returns a best-effort result.
pub struct SmartAttributionEngine {
    source: Arc<dyn SignalSource>,
    cache: Option<Arc<dyn ResultCache>>,
    settings: AttributionSettings,
    cache_ttl_secs: u64,
}

impl SmartAttributionEngine {
    pub fn new(source: Arc<dyn SignalSource>, settings: AttributionSettings) -> Self {
        Self {
            source,
            cache: None,
            settings,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>, ttl_secs: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl_secs = ttl_secs;
        self
    }

    pub async fn compute(&self, request: &AttributionRequest) -> AttributionReport {
        let request = normalize_range(request);
        let key = request.cache_key();

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(report)) => {
                    metrics::counter!("attribution.cache.hit").increment(1);
                    debug!(key = %key, "Attribution cache hit");
                    return report;
                }
                Ok(None) => {
                    metrics::counter!("attribution.cache.miss").increment(1);
                    debug!(key = %key, "Attribution cache miss");
                }
                Err(e) => {
                    metrics::counter!("attribution.cache.miss").increment(1);
                    warn!(key = %key, error = %e, "Attribution cache read failed");
                }
            }
        }

        info!(
            org_id = %request.org_id,
            start = %request.start_date,
            end = %request.end_date,
            "Computing attribution"
        );
        let signals = collect_signals(self.source.as_ref(), &request).await;
        let report = build_report(&request, &signals, &self.settings);
        metrics::counter!("attribution.reports.computed").increment(1);
        info!(
            org_id = %request.org_id,
            channels = report.attributions.len(),
            total_conversions = report.summary.total_conversions,
            failed_collectors = signals.failed_collectors.len(),
            "Attribution computed"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &report, self.cache_ttl_secs).await {
                warn!(key = %key, error = %e, "Attribution cache write failed");
            }
        }

        report
    }
}

fn normalize_range(request: &AttributionRequest) -> AttributionRequest {
    let mut request = request.clone();
    if request.start_date > request.end_date {
        warn!(
            org_id = %request.org_id,
            start = %request.start_date,
            end = %request.end_date,
            "Start date after end date; swapping"
        );
        std::mem::swap(&mut request.start_date, &mut request.end_date);
    }
    request
}

/// Assembles a report from already-collected signals.
pub fn build_report(
    request: &AttributionRequest,
    signals: &CollectedSignals,
    settings: &AttributionSettings,
) -> AttributionReport {
    let resolution = SignalHierarchyResolver::new(settings).resolve(signals);
    let summary = build_summary(&resolution.attributions, &signals.platform_metrics);
    let time_series = build_time_series(request, signals);
    let data_quality = DataQualityAssessor::new(settings).assess(signals, &resolution, &summary);

    AttributionReport {
        org_id: request.org_id.clone(),
        start_date: request.start_date,
        end_date: request.end_date,
        attributions: resolution.attributions,
        summary,
        time_series,
        data_quality,
        generated_at: Utc::now(),
    }
}
