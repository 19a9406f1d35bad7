//! Daily time series across the request window.
//!
//! Daily totals take `max(utm, connector)` conversions so neither double
//! counts nor under-reports, and prefer connector revenue whenever it exists.

use attribution_analytics::CollectedSignals;
use attribution_core::types::{AttributionRequest, DailyChannelPoint, TimeSeriesPoint};
use std::collections::BTreeSet;

use crate::channels::{aggregate_daily_platforms, aggregate_daily_utm};
use crate::distribution::daily_ground_truth;

pub fn build_time_series(
    request: &AttributionRequest,
    signals: &CollectedSignals,
) -> Vec<TimeSeriesPoint> {
    let utm_days = aggregate_daily_utm(&signals.daily_utm_performance);
    let platform_days = aggregate_daily_platforms(&signals.daily_platform_metrics);
    let connector_days = daily_ground_truth(&signals.daily_connector_revenue);

    request
        .days()
        .into_iter()
        .map(|date| {
            let utm = utm_days.get(&date);
            let platforms = platform_days.get(&date);
            let connector = connector_days.get(&date).copied().unwrap_or_default();

            let utm_conversions: f64 = utm.map_or(0.0, |c| c.values().map(|t| t.conversions).sum());
            let utm_revenue: f64 = utm.map_or(0.0, |c| c.values().map(|t| t.revenue).sum());
            let spend: f64 = platforms.map_or(0.0, |p| p.values().map(|m| m.spend).sum());

            let channels: BTreeSet<&String> = utm
                .into_iter()
                .flat_map(|c| c.keys())
                .chain(platforms.into_iter().flat_map(|p| p.keys()))
                .collect();

            let by_channel = channels
                .into_iter()
                .map(|channel| {
                    let tracked = utm.and_then(|c| c.get(channel)).copied().unwrap_or_default();
                    let reported = platforms.and_then(|p| p.get(channel));
                    // Platform numbers fill in only where tags saw no conversions.
                    let use_platform = tracked.conversions <= 0.0
                        && reported.map_or(false, |p| p.conversions > 0.0);
                    let (conversions, revenue) = match reported {
                        Some(p) if use_platform => (p.conversions, p.revenue),
                        _ => (tracked.conversions, tracked.revenue),
                    };
                    DailyChannelPoint {
                        channel: channel.clone(),
                        sessions: tracked.sessions,
                        conversions,
                        revenue,
                        spend: reported.map_or(0.0, |p| p.spend),
                        platform_reported: use_platform,
                    }
                })
                .collect();

            TimeSeriesPoint {
                date,
                total_conversions: utm_conversions.max(connector.conversions),
                total_revenue: if connector.revenue > 0.0 {
                    connector.revenue
                } else {
                    utm_revenue
                },
                utm_conversions,
                utm_revenue,
                connector_conversions: connector.conversions,
                connector_revenue: connector.revenue,
                spend,
                by_channel,
            }
        })
        .collect()
}
