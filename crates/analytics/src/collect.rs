//! Fan-out/fan-in over every collector. A failing collector yields an empty
//! result and a warning; it never cancels its siblings.

use attribution_core::signals::{
    ClickIdStats, ClickLevelAttribution, ConnectorRevenue, DailyConnectorRevenue,
    DailyPlatformMetrics, DailyUtmPerformance, FunnelPositionData, PlatformMetrics,
    UtmPerformance,
};
use attribution_core::types::AttributionRequest;
use attribution_core::AttributionResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::source::SignalSource;

/// Everything the collectors returned for one window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedSignals {
    #[serde(default)]
    pub platform_metrics: Vec<PlatformMetrics>,
    #[serde(default)]
    pub daily_platform_metrics: Vec<DailyPlatformMetrics>,
    #[serde(default)]
    pub utm_performance: Vec<UtmPerformance>,
    #[serde(default)]
    pub daily_utm_performance: Vec<DailyUtmPerformance>,
    #[serde(default)]
    pub connector_revenue: Vec<ConnectorRevenue>,
    #[serde(default)]
    pub daily_connector_revenue: Vec<DailyConnectorRevenue>,
    #[serde(default)]
    pub click_level_attribution: Vec<ClickLevelAttribution>,
    #[serde(default)]
    pub click_id_stats: ClickIdStats,
    #[serde(default)]
    pub funnel_position_data: Vec<FunnelPositionData>,
    /// Names of collectors that errored and were replaced by empty results.
    #[serde(default)]
    pub failed_collectors: Vec<String>,
}

/// Issue every collector query concurrently and wait for all of them.
pub async fn collect_signals(
    source: &dyn SignalSource,
    request: &AttributionRequest,
) -> CollectedSignals {
    let (
        platform_metrics,
        daily_platform_metrics,
        utm_performance,
        daily_utm_performance,
        connector_revenue,
        daily_connector_revenue,
        click_level_attribution,
        click_id_stats,
        funnel_position_data,
    ) = tokio::join!(
        source.platform_metrics(request),
        source.daily_platform_metrics(request),
        source.utm_performance(request),
        source.daily_utm_performance(request),
        source.connector_revenue(request),
        source.daily_connector_revenue(request),
        source.click_level_attribution(request),
        source.click_id_stats(request),
        source.funnel_position_data(request),
    );

    let mut failed = Vec::new();
    let signals = CollectedSignals {
        platform_metrics: or_empty("platform_metrics", platform_metrics, request, &mut failed),
        daily_platform_metrics: or_empty(
            "daily_platform_metrics",
            daily_platform_metrics,
            request,
            &mut failed,
        ),
        utm_performance: or_empty("utm_performance", utm_performance, request, &mut failed),
        daily_utm_performance: or_empty(
            "daily_utm_performance",
            daily_utm_performance,
            request,
            &mut failed,
        ),
        connector_revenue: or_empty("connector_revenue", connector_revenue, request, &mut failed),
        daily_connector_revenue: or_empty(
            "daily_connector_revenue",
            daily_connector_revenue,
            request,
            &mut failed,
        ),
        click_level_attribution: or_empty(
            "click_level_attribution",
            click_level_attribution,
            request,
            &mut failed,
        ),
        click_id_stats: or_empty("click_id_stats", click_id_stats, request, &mut failed),
        funnel_position_data: or_empty(
            "funnel_position_data",
            funnel_position_data,
            request,
            &mut failed,
        ),
        failed_collectors: Vec::new(),
    };

    debug!(
        org_id = %request.org_id,
        platforms = signals.platform_metrics.len(),
        utm_rows = signals.utm_performance.len(),
        connector_rows = signals.connector_revenue.len(),
        click_rows = signals.click_level_attribution.len(),
        failed = failed.len(),
        "Signal collection complete"
    );

    CollectedSignals {
        failed_collectors: failed,
        ..signals
    }
}

fn or_empty<T: Default>(
    collector: &'static str,
    result: AttributionResult<T>,
    request: &AttributionRequest,
    failed: &mut Vec<String>,
) -> T {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            metrics::counter!("attribution.collector.failed", "collector" => collector)
                .increment(1);
            warn!(
                org_id = %request.org_id,
                collector = collector,
                error = %e,
                "Collector failed, continuing with empty result"
            );
            failed.push(collector.to_string());
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SignalSnapshot, SnapshotSource};
    use async_trait::async_trait;
    use attribution_core::AttributionError;

    /// Delegates to a snapshot but fails the connector queries.
    struct FlakySource {
        inner: SnapshotSource,
    }

    #[async_trait]
    impl SignalSource for FlakySource {
        async fn platform_metrics(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<PlatformMetrics>> {
            self.inner.platform_metrics(request).await
        }
        async fn daily_platform_metrics(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<DailyPlatformMetrics>> {
            self.inner.daily_platform_metrics(request).await
        }
        async fn utm_performance(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<UtmPerformance>> {
            self.inner.utm_performance(request).await
        }
        async fn daily_utm_performance(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<DailyUtmPerformance>> {
            self.inner.daily_utm_performance(request).await
        }
        async fn connector_revenue(
            &self,
            _request: &AttributionRequest,
        ) -> AttributionResult<Vec<ConnectorRevenue>> {
            Err(AttributionError::collector("connector_revenue", "connection reset"))
        }
        async fn daily_connector_revenue(
            &self,
            _request: &AttributionRequest,
        ) -> AttributionResult<Vec<DailyConnectorRevenue>> {
            Err(AttributionError::collector("daily_connector_revenue", "timeout"))
        }
        async fn click_level_attribution(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<ClickLevelAttribution>> {
            self.inner.click_level_attribution(request).await
        }
        async fn click_id_stats(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<ClickIdStats> {
            self.inner.click_id_stats(request).await
        }
        async fn funnel_position_data(
            &self,
            request: &AttributionRequest,
        ) -> AttributionResult<Vec<FunnelPositionData>> {
            self.inner.funnel_position_data(request).await
        }
    }

    fn request() -> AttributionRequest {
        AttributionRequest::new(
            "org_1",
            "2024-05-01".parse().unwrap(),
            "2024-05-07".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_failed_collectors_become_empty() {
        let snapshot = SignalSnapshot {
            platform_metrics: vec![PlatformMetrics {
                platform: "google".into(),
                spend: 120.0,
                conversions: 4.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let source = FlakySource {
            inner: SnapshotSource::new(snapshot),
        };

        let signals = collect_signals(&source, &request()).await;

        assert_eq!(signals.platform_metrics.len(), 1);
        assert!(signals.connector_revenue.is_empty());
        assert!(signals.daily_connector_revenue.is_empty());
        assert_eq!(
            signals.failed_collectors,
            vec!["connector_revenue", "daily_connector_revenue"]
        );
    }

    #[tokio::test]
    async fn test_healthy_source_reports_no_failures() {
        let source = SnapshotSource::new(SignalSnapshot::default());
        let signals = collect_signals(&source, &request()).await;
        assert!(signals.failed_collectors.is_empty());
        assert!(!signals.click_id_stats.has_click_ids);
    }
}
