//! Data-quality flags and plain-language recommendations.

use attribution_analytics::CollectedSignals;
use attribution_core::config::AttributionSettings;
use attribution_core::types::{AttributionSummary, DataQualityReport};

use crate::channels::aggregate_platforms;
use crate::hierarchy::Resolution;

const MIN_DATA_COMPLETENESS: f64 = 50.0;

pub struct DataQualityAssessor<'a> {
    settings: &'a AttributionSettings,
}

impl<'a> DataQualityAssessor<'a> {
    pub fn new(settings: &'a AttributionSettings) -> Self {
        Self { settings }
    }

    pub fn assess(
        &self,
        signals: &CollectedSignals,
        resolution: &Resolution,
        summary: &AttributionSummary,
    ) -> DataQualityReport {
        let platforms = aggregate_platforms(&signals.platform_metrics);
        let has_platform_data = !platforms.is_empty();
        let has_tag_data = signals.utm_performance.iter().any(|row| row.sessions > 0);
        let has_click_ids = signals.click_id_stats.has_click_ids
            || signals
                .click_level_attribution
                .iter()
                .any(|row| row.conversions > 0.0);
        let has_connector_data = resolution.ground_truth.has_data();
        let has_time_decay_data = resolution.has_time_decay_data;

        let mut recommendations = Vec::new();

        if !has_connector_data {
            recommendations.push(
                "Connect a revenue source (e.g. Stripe or Shopify) so attribution can be \
                 reconciled against real conversions."
                    .to_string(),
            );
        }
        if has_platform_data && !has_click_ids {
            recommendations.push(
                "Enable auto-tagging (gclid/fbclid) on your ad platforms to attribute \
                 conversions with click-level precision."
                    .to_string(),
            );
        }
        if !has_tag_data {
            recommendations.push(
                "Install the tracking tag and add UTM parameters to campaign links to \
                 measure traffic directly."
                    .to_string(),
            );
        }
        for (name, metrics) in &platforms {
            if metrics.spend > 0.0 && metrics.conversions <= 0.0 {
                recommendations.push(format!(
                    "{name} reports {:.2} in spend but no conversions; verify conversion \
                     tracking is configured on that platform.",
                    metrics.spend
                ));
            }
        }
        if has_connector_data && !has_time_decay_data {
            recommendations.push(
                "Not enough daily revenue history for time-decay weighting; estimated \
                 channels were credited by session share."
                    .to_string(),
            );
        }

        let platform_conversions: f64 = platforms.values().map(|p| p.conversions).sum();
        let truth = resolution.ground_truth.conversions;
        if has_connector_data
            && truth > 0.0
            && platform_conversions > truth * self.settings.platform_overreport_ratio
        {
            recommendations.push(format!(
                "Ad platforms report {platform_conversions:.0} conversions against {truth:.0} \
                 recorded by your revenue source; platform numbers are likely over-counted."
            ));
        }

        if summary.total_conversions > 0.0 && summary.data_completeness < MIN_DATA_COMPLETENESS {
            recommendations.push(format!(
                "Only {:.0}% of conversions are backed by first-party signals; improve UTM \
                 coverage to raise attribution confidence.",
                summary.data_completeness
            ));
        }

        if !signals.failed_collectors.is_empty() {
            recommendations.push(format!(
                "Some data could not be loaded ({}); results may be incomplete.",
                signals.failed_collectors.join(", ")
            ));
        }

        DataQualityReport {
            has_platform_data,
            has_tag_data,
            has_click_ids,
            has_connector_data,
            has_time_decay_data,
            click_id_count: signals.click_id_stats.click_id_count,
            failed_collectors: signals.failed_collectors.clone(),
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::GroundTruth;
    use attribution_core::signals::{ConnectorRevenue, PlatformMetrics, UtmPerformance};

    fn resolution(conversions: f64, has_time_decay_data: bool) -> Resolution {
        Resolution {
            attributions: Vec::new(),
            ground_truth: GroundTruth {
                conversions,
                revenue: conversions * 10.0,
            },
            distribution_path: None,
            has_time_decay_data,
        }
    }

    fn contains(report: &DataQualityReport, needle: &str) -> bool {
        report.recommendations.iter().any(|r| r.contains(needle))
    }

    #[test]
    fn test_platform_only_recommendations() {
        let settings = AttributionSettings::default();
        let signals = CollectedSignals {
            platform_metrics: vec![
                PlatformMetrics {
                    platform: "fb".into(),
                    spend: 200.0,
                    conversions: 4.0,
                    ..Default::default()
                },
                PlatformMetrics {
                    platform: "tiktok".into(),
                    spend: 80.0,
                    conversions: 0.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let report = DataQualityAssessor::new(&settings).assess(
            &signals,
            &resolution(0.0, false),
            &AttributionSummary::default(),
        );

        assert!(report.has_platform_data);
        assert!(!report.has_connector_data);
        assert!(!report.has_tag_data);
        assert!(!report.has_click_ids);
        assert!(contains(&report, "Connect a revenue source"));
        assert!(contains(&report, "auto-tagging"));
        assert!(contains(&report, "tracking tag"));
        assert!(contains(&report, "tiktok"));
        assert!(contains(&report, "verify conversion tracking"));
        assert!(!contains(&report, "time-decay"));
    }

    #[test]
    fn test_overreport_and_failed_collectors() {
        let settings = AttributionSettings::default();
        let signals = CollectedSignals {
            platform_metrics: vec![PlatformMetrics {
                platform: "google".into(),
                spend: 100.0,
                conversions: 30.0,
                ..Default::default()
            }],
            utm_performance: vec![UtmPerformance {
                utm_source: Some("google".into()),
                utm_medium: None,
                utm_campaign: None,
                sessions: 120,
                conversions: 8.0,
                revenue: 80.0,
            }],
            connector_revenue: vec![ConnectorRevenue {
                source: "stripe".into(),
                conversions: 10.0,
                revenue: 100.0,
            }],
            failed_collectors: vec!["click_id_stats".into()],
            ..Default::default()
        };
        let summary = AttributionSummary {
            total_conversions: 10.0,
            data_completeness: 80.0,
            ..Default::default()
        };

        let report = DataQualityAssessor::new(&settings).assess(
            &signals,
            &resolution(10.0, false),
            &summary,
        );

        assert!(report.has_connector_data);
        assert!(report.has_tag_data);
        assert_eq!(report.failed_collectors, vec!["click_id_stats".to_string()]);
        assert!(contains(&report, "over-counted"));
        assert!(contains(&report, "time-decay"));
        assert!(contains(&report, "click_id_stats"));
        assert!(!contains(&report, "Connect a revenue source"));
        assert!(!contains(&report, "first-party"));
    }

    #[test]
    fn test_low_completeness() {
        let settings = AttributionSettings::default();
        let summary = AttributionSummary {
            total_conversions: 10.0,
            data_completeness: 20.0,
            ..Default::default()
        };
        let report = DataQualityAssessor::new(&settings).assess(
            &CollectedSignals::default(),
            &resolution(10.0, true),
            &summary,
        );
        assert!(contains(&report, "Only 20% of conversions"));
        assert!(report.has_time_decay_data);
    }
}
