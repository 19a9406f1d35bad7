//! In-memory `SignalSource` backed by a JSON document, for offline runs and tests.

use std::path::Path;

use async_trait::async_trait;
use attribution_core::signals::{
    ClickIdStats, ClickLevelAttribution, ConnectorRevenue, DailyConnectorRevenue,
    DailyPlatformMetrics, DailyUtmPerformance, FunnelPositionData, PlatformMetrics,
    UtmPerformance,
};
use attribution_core::types::AttributionRequest;
use attribution_core::AttributionResult;
use chrono::NaiveDate;
use tracing::info;

use crate::collect::CollectedSignals;
use crate::source::SignalSource;

/// Snapshot documents share the collected-signals shape. `failed_collectors`
/// in a document is ignored.
pub type SignalSnapshot = CollectedSignals;

pub struct SnapshotSource {
    snapshot: SignalSnapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: SignalSnapshot) -> Self {
        Self { snapshot }
    }

    /// Read a snapshot document from disk.
    pub async fn load(path: impl AsRef<Path>) -> AttributionResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: SignalSnapshot = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            platforms = snapshot.platform_metrics.len(),
            utm_rows = snapshot.utm_performance.len(),
            connector_rows = snapshot.connector_revenue.len(),
            "Loaded signal snapshot"
        );
        Ok(Self::new(snapshot))
    }
}

fn in_window(date: NaiveDate, request: &AttributionRequest) -> bool {
    date >= request.start_date && date <= request.end_date
}

#[async_trait]
impl SignalSource for SnapshotSource {
    async fn platform_metrics(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<Vec<PlatformMetrics>> {
        Ok(self.snapshot.platform_metrics.clone())
    }

    async fn daily_platform_metrics(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyPlatformMetrics>> {
        Ok(self
            .snapshot
            .daily_platform_metrics
            .iter()
            .filter(|r| in_window(r.date, request))
            .cloned()
            .collect())
    }

    async fn utm_performance(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<Vec<UtmPerformance>> {
        Ok(self.snapshot.utm_performance.clone())
    }

    async fn daily_utm_performance(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyUtmPerformance>> {
        Ok(self
            .snapshot
            .daily_utm_performance
            .iter()
            .filter(|r| in_window(r.date, request))
            .cloned()
            .collect())
    }

    async fn connector_revenue(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<Vec<ConnectorRevenue>> {
        Ok(self.snapshot.connector_revenue.clone())
    }

    async fn daily_connector_revenue(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyConnectorRevenue>> {
        Ok(self
            .snapshot
            .daily_connector_revenue
            .iter()
            .filter(|r| in_window(r.date, request))
            .cloned()
            .collect())
    }

    async fn click_level_attribution(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<Vec<ClickLevelAttribution>> {
        Ok(self.snapshot.click_level_attribution.clone())
    }

    async fn click_id_stats(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<ClickIdStats> {
        Ok(self.snapshot.click_id_stats.clone())
    }

    async fn funnel_position_data(
        &self,
        _request: &AttributionRequest,
    ) -> AttributionResult<Vec<FunnelPositionData>> {
        Ok(self.snapshot.funnel_position_data.clone())
    }
}
