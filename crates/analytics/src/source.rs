//! Read contract for the signal collectors.

use async_trait::async_trait;
use attribution_core::signals::{
    ClickIdStats, ClickLevelAttribution, ConnectorRevenue, DailyConnectorRevenue,
    DailyPlatformMetrics, DailyUtmPerformance, FunnelPositionData, PlatformMetrics,
    UtmPerformance,
};
use attribution_core::types::AttributionRequest;
use attribution_core::AttributionResult;

/// Independent read-only queries over one org and inclusive date range.
///
/// Implementations must not depend on call order: the pipeline issues every
/// query concurrently and treats each failure in isolation.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Aggregated ad-platform self-reported metrics.
    async fn platform_metrics(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<PlatformMetrics>>;

    async fn daily_platform_metrics(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyPlatformMetrics>>;

    /// Session performance keyed by `utm_source`. Direct traffic comes back
    /// with a `None` source.
    async fn utm_performance(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<UtmPerformance>>;

    async fn daily_utm_performance(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyUtmPerformance>>;

    /// Ground truth, counting only succeeded/paid/completed/active events.
    async fn connector_revenue(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<ConnectorRevenue>>;

    async fn daily_connector_revenue(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyConnectorRevenue>>;

    async fn click_level_attribution(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<ClickLevelAttribution>>;

    async fn click_id_stats(&self, request: &AttributionRequest)
        -> AttributionResult<ClickIdStats>;

    async fn funnel_position_data(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<FunnelPositionData>>;
}
