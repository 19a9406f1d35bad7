//! Summary statistics over the resolved channel attributions.

use attribution_core::signals::PlatformMetrics;
use attribution_core::types::{
    AttributionSummary, ChannelAttribution, SignalBreakdownEntry, SignalType,
};
use std::collections::BTreeMap;

fn percentage(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

pub fn build_summary(
    attributions: &[ChannelAttribution],
    platform_metrics: &[PlatformMetrics],
) -> AttributionSummary {
    let total_conversions: f64 = attributions.iter().map(|a| a.conversions).sum();
    let total_revenue: f64 = attributions.iter().map(|a| a.revenue).sum();
    let total_spend: f64 = platform_metrics.iter().map(|p| p.spend.max(0.0)).sum();

    let mut by_signal: BTreeMap<SignalType, f64> = BTreeMap::new();
    for attribution in attributions {
        *by_signal.entry(attribution.signal_type).or_insert(0.0) += attribution.conversions;
    }
    let signal_breakdown = by_signal
        .into_iter()
        .map(|(signal_type, conversions)| SignalBreakdownEntry {
            signal_type,
            conversions,
            percentage: percentage(conversions, total_conversions),
        })
        .collect();

    let first_party: f64 = attributions
        .iter()
        .filter(|a| a.signal_type.is_first_party())
        .map(|a| a.conversions)
        .sum();

    let average_confidence = if total_conversions > 0.0 {
        attributions
            .iter()
            .map(|a| f64::from(a.confidence) * a.conversions)
            .sum::<f64>()
            / total_conversions
    } else {
        0.0
    };

    AttributionSummary {
        total_conversions,
        total_revenue,
        total_spend,
        blended_roas: if total_spend > 0.0 {
            total_revenue / total_spend
        } else {
            0.0
        },
        channel_count: attributions.len(),
        average_confidence,
        signal_breakdown,
        data_completeness: percentage(first_party, total_conversions),
    }
}
