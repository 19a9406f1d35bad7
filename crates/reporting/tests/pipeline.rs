//! End-to-end attribution scenarios over an in-memory snapshot.

use async_trait::async_trait;
use attribution_analytics::{SignalSnapshot, SignalSource, SnapshotSource};
use attribution_cache::LocalCache;
use attribution_core::config::AttributionSettings;
use attribution_core::signals::{
    ClickIdStats, ClickLevelAttribution, ConnectorRevenue, DailyConnectorRevenue,
    DailyPlatformMetrics, DailyUtmPerformance, FunnelPositionData, PlatformMetrics,
    UtmPerformance,
};
use attribution_core::types::{AttributionRequest, DataQuality, SignalType};
use attribution_core::{AttributionError, AttributionResult};
use attribution_reporting::{calculate_confidence, SmartAttributionEngine};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn request() -> AttributionRequest {
    AttributionRequest::new("org_1", d("2024-06-01"), d("2024-06-02"))
}

fn engine(snapshot: SignalSnapshot) -> SmartAttributionEngine {
    SmartAttributionEngine::new(
        Arc::new(SnapshotSource::new(snapshot)),
        AttributionSettings::default(),
    )
}

fn utm(source: &str, sessions: u64, conversions: f64, revenue: f64) -> UtmPerformance {
    UtmPerformance {
        utm_source: Some(source.into()),
        utm_medium: Some("referral".into()),
        utm_campaign: None,
        sessions,
        conversions,
        revenue,
    }
}

fn daily_utm(date: &str, source: &str, sessions: u64) -> DailyUtmPerformance {
    DailyUtmPerformance {
        date: d(date),
        utm_source: Some(source.into()),
        utm_medium: Some("referral".into()),
        utm_campaign: None,
        sessions,
        conversions: 0.0,
        revenue: 0.0,
    }
}

fn connector(conversions: f64, revenue: f64) -> ConnectorRevenue {
    ConnectorRevenue {
        source: "stripe".into(),
        conversions,
        revenue,
    }
}

fn daily_connector(date: &str, conversions: f64, revenue: f64) -> DailyConnectorRevenue {
    DailyConnectorRevenue {
        date: d(date),
        source: "stripe".into(),
        conversions,
        revenue,
    }
}

fn platform(name: &str, spend: f64, conversions: f64, revenue: f64) -> PlatformMetrics {
    PlatformMetrics {
        platform: name.into(),
        spend,
        impressions: 1_000,
        clicks: 100,
        conversions,
        revenue,
    }
}

#[tokio::test]
async fn test_unmatched_ground_truth_is_distributed() {
    let snapshot = SignalSnapshot {
        utm_performance: vec![utm("newsletter", 120, 0.0, 0.0), utm("partner_blog", 100, 0.0, 0.0)],
        daily_utm_performance: vec![
            daily_utm("2024-06-01", "newsletter", 70),
            daily_utm("2024-06-01", "partner_blog", 40),
            daily_utm("2024-06-02", "newsletter", 50),
            daily_utm("2024-06-02", "partner_blog", 60),
        ],
        connector_revenue: vec![connector(39.0, 870.0)],
        daily_connector_revenue: vec![
            daily_connector("2024-06-01", 20.0, 450.0),
            daily_connector("2024-06-02", 19.0, 420.0),
        ],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    assert_eq!(report.attributions.len(), 2);
    assert!(report.attributions.iter().all(|a| a.channel != "direct"));
    for attribution in &report.attributions {
        assert!(attribution.is_estimated);
        assert_eq!(attribution.data_quality, DataQuality::Estimated);
        assert!(
            (65..=85).contains(&attribution.confidence),
            "{} confidence {}",
            attribution.channel,
            attribution.confidence
        );
        assert!(attribution.conversions > 0.0);
    }

    let conversions: f64 = report.attributions.iter().map(|a| a.conversions).sum();
    let revenue: f64 = report.attributions.iter().map(|a| a.revenue).sum();
    assert!((conversions - 39.0).abs() < 0.01);
    assert!((revenue - 870.0).abs() < 0.01);
    assert!(report.data_quality.has_time_decay_data);
    assert!(report.data_quality.has_connector_data);
}

#[tokio::test]
async fn test_few_sessions_keep_estimated_confidence_band() {
    let snapshot = SignalSnapshot {
        utm_performance: vec![utm("google", 12, 0.0, 0.0), utm("fb", 8, 0.0, 0.0)],
        daily_utm_performance: vec![
            daily_utm("2024-06-01", "google", 7),
            daily_utm("2024-06-01", "fb", 3),
            daily_utm("2024-06-02", "google", 5),
            daily_utm("2024-06-02", "fb", 5),
        ],
        connector_revenue: vec![connector(39.0, 870.0)],
        daily_connector_revenue: vec![
            daily_connector("2024-06-01", 20.0, 450.0),
            daily_connector("2024-06-02", 19.0, 420.0),
        ],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    assert_eq!(report.attributions.len(), 2);
    for attribution in &report.attributions {
        assert!(attribution.conversions > 0.0);
        assert!(
            (65..=85).contains(&attribution.confidence),
            "{} confidence {}",
            attribution.channel,
            attribution.confidence
        );
    }
    let conversions: f64 = report.attributions.iter().map(|a| a.conversions).sum();
    assert!((conversions - 39.0).abs() < 0.01);
}

#[tokio::test]
async fn test_click_ids_explain_everything() {
    let snapshot = SignalSnapshot {
        connector_revenue: vec![connector(5.0, 500.0)],
        click_level_attribution: vec![ClickLevelAttribution {
            platform: "google".into(),
            click_id_type: "gclid".into(),
            model: "last_touch".into(),
            revenue: 500.0,
            conversions: 5.0,
            credit_percent: 100.0,
        }],
        click_id_stats: ClickIdStats {
            has_click_ids: true,
            click_id_count: 5,
            ..Default::default()
        },
        platform_metrics: vec![platform("google_ads", 100.0, 5.0, 500.0)],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    assert_eq!(report.attributions.len(), 1);
    let google = &report.attributions[0];
    assert_eq!(google.channel, "google");
    assert_eq!(google.signal_type, SignalType::ClickId);
    assert_eq!(google.confidence, 100);
    assert_eq!(google.data_quality, DataQuality::Verified);
    assert!(!google.is_estimated);
    assert!((google.conversions - 5.0).abs() < 1e-9);
    assert_eq!(report.data_quality.click_id_count, 5);
    assert!((report.summary.data_completeness - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_platform_only_without_ground_truth() {
    let snapshot = SignalSnapshot {
        platform_metrics: vec![
            platform("facebook", 200.0, 8.0, 400.0),
            platform("google", 100.0, 3.0, 90.0),
        ],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    assert_eq!(report.attributions.len(), 2);
    for attribution in &report.attributions {
        assert_eq!(attribution.signal_type, SignalType::PlatformOnly);
        assert_eq!(
            attribution.confidence,
            calculate_confidence(70, attribution.conversions)
        );
    }
    assert_eq!(report.attributions[0].channel, "facebook");
    assert!(!report.data_quality.has_connector_data);
    assert!(report
        .data_quality
        .recommendations
        .iter()
        .any(|r| r.contains("Connect a revenue source")));
    assert!((report.summary.total_spend - 300.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_totals_reconcile_to_ground_truth() {
    let snapshot = SignalSnapshot {
        utm_performance: vec![utm("google", 200, 8.0, 90.0)],
        platform_metrics: vec![
            platform("google", 100.0, 9.0, 95.0),
            platform("tiktok", 50.0, 6.0, 60.0),
        ],
        connector_revenue: vec![connector(10.0, 100.0)],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    let conversions: f64 = report.attributions.iter().map(|a| a.conversions).sum();
    let revenue: f64 = report.attributions.iter().map(|a| a.revenue).sum();
    assert!((conversions - 10.0).abs() < 0.01);
    assert!((revenue - 100.0).abs() < 0.01);

    let google = report.attributions.iter().find(|a| a.channel == "google").unwrap();
    assert_eq!(google.signal_type, SignalType::UtmWithSpend);
    assert!((google.conversions - 8.0).abs() < 1e-9);

    let tiktok = report.attributions.iter().find(|a| a.channel == "tiktok").unwrap();
    assert_eq!(tiktok.signal_type, SignalType::PlatformOnly);
    assert!((tiktok.conversions - 2.0).abs() < 0.01);
}

#[tokio::test]
async fn test_aliases_merge_into_one_channel() {
    let snapshot = SignalSnapshot {
        utm_performance: vec![
            utm("fb", 40, 1.0, 20.0),
            utm("facebook", 40, 2.0, 40.0),
            utm("instagram", 40, 1.0, 20.0),
        ],
        platform_metrics: vec![platform("meta", 150.0, 6.0, 120.0)],
        ..Default::default()
    };

    let report = engine(snapshot).compute(&request()).await;

    assert_eq!(report.attributions.len(), 1);
    let facebook = &report.attributions[0];
    assert_eq!(facebook.channel, "facebook");
    assert_eq!(facebook.signal_type, SignalType::UtmWithSpend);
    assert!((facebook.conversions - 4.0).abs() < 1e-9);
    assert!((facebook.signals.platform_spend - 150.0).abs() < 1e-9);
}

/// Counts how often the platform collector is queried.
struct CountingSource {
    inner: SnapshotSource,
    calls: AtomicUsize,
}

#[async_trait]
impl SignalSource for CountingSource {
    async fn platform_metrics(&self, r: &AttributionRequest) -> AttributionResult<Vec<PlatformMetrics>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.platform_metrics(r).await
    }
    async fn daily_platform_metrics(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyPlatformMetrics>> {
        self.inner.daily_platform_metrics(r).await
    }
    async fn utm_performance(&self, r: &AttributionRequest) -> AttributionResult<Vec<UtmPerformance>> {
        self.inner.utm_performance(r).await
    }
    async fn daily_utm_performance(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyUtmPerformance>> {
        self.inner.daily_utm_performance(r).await
    }
    async fn connector_revenue(&self, r: &AttributionRequest) -> AttributionResult<Vec<ConnectorRevenue>> {
        self.inner.connector_revenue(r).await
    }
    async fn daily_connector_revenue(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyConnectorRevenue>> {
        self.inner.daily_connector_revenue(r).await
    }
    async fn click_level_attribution(&self, r: &AttributionRequest) -> AttributionResult<Vec<ClickLevelAttribution>> {
        self.inner.click_level_attribution(r).await
    }
    async fn click_id_stats(&self, r: &AttributionRequest) -> AttributionResult<ClickIdStats> {
        self.inner.click_id_stats(r).await
    }
    async fn funnel_position_data(&self, r: &AttributionRequest) -> AttributionResult<Vec<FunnelPositionData>> {
        self.inner.funnel_position_data(r).await
    }
}

#[tokio::test]
async fn test_cache_hit_returns_identical_report() {
    let source = Arc::new(CountingSource {
        inner: SnapshotSource::new(SignalSnapshot {
            platform_metrics: vec![platform("google", 100.0, 3.0, 90.0)],
            ..Default::default()
        }),
        calls: AtomicUsize::new(0),
    });
    let engine = SmartAttributionEngine::new(source.clone(), AttributionSettings::default())
        .with_cache(Arc::new(LocalCache::new(100)), 300);

    let first = engine.compute(&request()).await;
    let second = engine.compute(&request()).await;

    assert_eq!(first, second);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    // A reversed range resolves to the same cache entry.
    let reversed = AttributionRequest::new("org_1", d("2024-06-02"), d("2024-06-01"));
    let third = engine.compute(&reversed).await;
    assert_eq!(third, first);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

/// Fails the UTM and click collectors, serves the rest from a snapshot.
struct PartiallyFailingSource {
    inner: SnapshotSource,
}

fn unavailable(collector: &'static str) -> AttributionError {
    AttributionError::Collector {
        collector,
        message: "connection refused".into(),
    }
}

#[async_trait]
impl SignalSource for PartiallyFailingSource {
    async fn platform_metrics(&self, r: &AttributionRequest) -> AttributionResult<Vec<PlatformMetrics>> {
        self.inner.platform_metrics(r).await
    }
    async fn daily_platform_metrics(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyPlatformMetrics>> {
        self.inner.daily_platform_metrics(r).await
    }
    async fn utm_performance(&self, _r: &AttributionRequest) -> AttributionResult<Vec<UtmPerformance>> {
        Err(unavailable("utm_performance"))
    }
    async fn daily_utm_performance(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyUtmPerformance>> {
        self.inner.daily_utm_performance(r).await
    }
    async fn connector_revenue(&self, r: &AttributionRequest) -> AttributionResult<Vec<ConnectorRevenue>> {
        self.inner.connector_revenue(r).await
    }
    async fn daily_connector_revenue(&self, r: &AttributionRequest) -> AttributionResult<Vec<DailyConnectorRevenue>> {
        self.inner.daily_connector_revenue(r).await
    }
    async fn click_level_attribution(&self, _r: &AttributionRequest) -> AttributionResult<Vec<ClickLevelAttribution>> {
        Err(unavailable("click_level_attribution"))
    }
    async fn click_id_stats(&self, r: &AttributionRequest) -> AttributionResult<ClickIdStats> {
        self.inner.click_id_stats(r).await
    }
    async fn funnel_position_data(&self, r: &AttributionRequest) -> AttributionResult<Vec<FunnelPositionData>> {
        self.inner.funnel_position_data(r).await
    }
}

#[tokio::test]
async fn test_collector_failures_degrade_gracefully() {
    let source = PartiallyFailingSource {
        inner: SnapshotSource::new(SignalSnapshot {
            utm_performance: vec![utm("google", 100, 4.0, 40.0)],
            connector_revenue: vec![connector(6.0, 60.0)],
            ..Default::default()
        }),
    };
    let engine = SmartAttributionEngine::new(Arc::new(source), AttributionSettings::default());

    let report = engine.compute(&request()).await;

    assert_eq!(
        report.data_quality.failed_collectors,
        vec!["utm_performance".to_string(), "click_level_attribution".to_string()]
    );
    assert!(report
        .data_quality
        .recommendations
        .iter()
        .any(|r| r.contains("utm_performance")));

    // Without UTM rows the whole ground truth falls to direct.
    assert_eq!(report.attributions.len(), 1);
    let direct = &report.attributions[0];
    assert_eq!(direct.channel, "direct");
    assert_eq!(direct.signal_type, SignalType::Direct);
    assert_eq!(direct.confidence, 0);
    assert!((direct.conversions - 6.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_report_json_contract() {
    let snapshot = SignalSnapshot {
        platform_metrics: vec![platform("tiktok", 40.0, 2.0, 30.0)],
        ..Default::default()
    };
    let report = engine(snapshot).compute(&request()).await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["orgId"], "org_1");
    assert_eq!(json["startDate"], "2024-06-01");
    assert_eq!(json["attributions"][0]["signalType"], "platform_only");
    assert_eq!(json["attributions"][0]["dataQuality"], "single_source");
    assert_eq!(json["attributions"][0]["isEstimated"], false);
    assert!(json["summary"]["signalBreakdown"].is_array());
    assert_eq!(json["timeSeries"].as_array().unwrap().len(), 2);
    assert_eq!(json["dataQuality"]["hasConnectorData"], false);
}
