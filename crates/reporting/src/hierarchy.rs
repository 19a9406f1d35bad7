//! Signal hierarchy: explains ground-truth conversions with the strongest
//! evidence first and hands only the unexplained remainder to the next tier.
//!
//! Tiers: click id -> directly tracked UTM -> distributed estimate ->
//! platform self-reported -> direct/unattributed.

use attribution_analytics::CollectedSignals;
use attribution_core::config::AttributionSettings;
use attribution_core::signals::{ClickLevelAttribution, ConnectorRevenue, PlatformMetrics};
use attribution_core::types::{ChannelAttribution, DataQuality, SignalAvailability, SignalType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::channels::{
    aggregate_daily_utm, aggregate_platforms, aggregate_utm, channel_key, platform_alias,
    ChannelAggregate, DIRECT_CHANNEL,
};
use crate::confidence::{calculate_confidence, signal_confidence};
use crate::distribution::{
    daily_ground_truth, funnel_weights, time_decay_eligible, Distribution, DistributionEngine,
    DistributionInput, DistributionPath, NO_PROXIMITY_BASE_CONFIDENCE,
};

/// Sum of the connector rows: the reconciliation target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundTruth {
    pub conversions: f64,
    pub revenue: f64,
}

impl GroundTruth {
    pub fn from_rows(rows: &[ConnectorRevenue]) -> Self {
        rows.iter().fold(Self::default(), |acc, row| Self {
            conversions: acc.conversions + row.conversions.max(0.0),
            revenue: acc.revenue + row.revenue.max(0.0),
        })
    }

    pub fn has_data(&self) -> bool {
        self.conversions > 0.0 || self.revenue > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ClickTotals {
    conversions: f64,
    revenue: f64,
    click_id_types: BTreeSet<String>,
}

/// Last-touch click rows summed per normalized platform.
fn aggregate_clicks(rows: &[ClickLevelAttribution]) -> BTreeMap<String, ClickTotals> {
    let mut clicks: BTreeMap<String, ClickTotals> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_last_touch()) {
        let totals = clicks.entry(channel_key(&row.platform)).or_default();
        totals.conversions += row.conversions.max(0.0);
        totals.revenue += row.revenue.max(0.0);
        totals.click_id_types.insert(row.click_id_type.clone());
    }
    clicks
}

/// Output of one resolver run.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub attributions: Vec<ChannelAttribution>,
    pub ground_truth: GroundTruth,
    pub distribution_path: Option<DistributionPath>,
    pub has_time_decay_data: bool,
}

pub struct SignalHierarchyResolver<'a> {
    settings: &'a AttributionSettings,
}

/// Per-run lookup tables shared by the tiers.
struct Inputs {
    platforms: BTreeMap<String, PlatformMetrics>,
    channels: BTreeMap<String, ChannelAggregate>,
    clicks: BTreeMap<String, ClickTotals>,
}

impl Inputs {
    fn platform(&self, channel: &str) -> Option<&PlatformMetrics> {
        self.platforms.get(channel)
    }

    /// A channel matches a platform through the alias table or a metrics row.
    fn matched_platform(&self, channel: &str) -> Option<String> {
        platform_alias(channel)
            .map(String::from)
            .or_else(|| self.platforms.contains_key(channel).then(|| channel.to_string()))
    }

    fn utm_signal_type(&self, channel: &str) -> SignalType {
        match (self.matched_platform(channel), self.platform(channel)) {
            (Some(_), Some(p)) if p.spend > 0.0 => SignalType::UtmWithSpend,
            (Some(_), _) => SignalType::UtmNoSpend,
            (None, _) => SignalType::UtmOnly,
        }
    }

    fn availability(&self, channel: &str) -> SignalAvailability {
        let click = self.clicks.get(channel);
        let utm = self.channels.get(channel);
        let platform = self.platform(channel);
        SignalAvailability {
            has_click_ids: click.map_or(false, |c| c.conversions > 0.0),
            click_id_conversions: click.map_or(0.0, |c| c.conversions),
            has_utm_match: utm.is_some() && self.matched_platform(channel).is_some(),
            utm_sessions: utm.map_or(0, |u| u.sessions),
            utm_conversions: utm.map_or(0.0, |u| u.conversions),
            has_active_spend: platform.map_or(false, |p| p.spend > 0.0),
            platform_spend: platform.map_or(0.0, |p| p.spend),
            has_platform_data: platform.is_some(),
            platform_conversions: platform.map_or(0.0, |p| p.conversions),
            has_tag_data: utm.map_or(false, |u| u.sessions > 0 || u.conversions > 0.0),
        }
    }
}

fn spend_note(signals: &SignalAvailability) -> String {
    if signals.has_active_spend {
        format!("{:.2} active spend", signals.platform_spend)
    } else if signals.has_platform_data {
        "no spend in period".to_string()
    } else {
        "no ad platform match".to_string()
    }
}

impl<'a> SignalHierarchyResolver<'a> {
    pub fn new(settings: &'a AttributionSettings) -> Self {
        Self { settings }
    }

    pub fn resolve(&self, signals: &CollectedSignals) -> Resolution {
        let inputs = Inputs {
            platforms: aggregate_platforms(&signals.platform_metrics),
            channels: aggregate_utm(&signals.utm_performance),
            clicks: aggregate_clicks(&signals.click_level_attribution),
        };
        let ground_truth = GroundTruth::from_rows(&signals.connector_revenue);
        let daily_sessions = aggregate_daily_utm(&signals.daily_utm_performance);
        let daily_truth = daily_ground_truth(&signals.daily_connector_revenue);
        let has_time_decay_data = time_decay_eligible(&daily_truth, &daily_sessions);

        let mut records: Vec<ChannelAttribution> = Vec::new();

        // Tier 1: click identifiers.
        let mut processed: BTreeSet<String> = BTreeSet::new();
        for (channel, click) in &inputs.clicks {
            if click.conversions <= 0.0 {
                continue;
            }
            records.push(self.click_record(&inputs, channel, click));
            processed.insert(channel.clone());
        }

        // Tier 2: directly tracked UTM conversions. Channels with sessions but
        // no tracked conversions become distribution candidates.
        let mut candidates: BTreeMap<String, u64> = BTreeMap::new();
        for (channel, utm) in &inputs.channels {
            if utm.is_direct || processed.contains(channel) {
                continue;
            }
            if utm.conversions > 0.0 {
                records.push(self.utm_record(&inputs, utm));
            } else if utm.sessions > 0 {
                candidates.insert(channel.clone(), utm.sessions);
            }
        }

        let explained = totals(&records);
        debug!(
            click_conversions = inputs.clicks.values().map(|c| c.conversions).sum::<f64>(),
            explained_conversions = explained.conversions,
            ground_truth = ground_truth.conversions,
            "Direct signal tiers resolved"
        );

        // Tier 3: distribute what ground truth still leaves unexplained.
        // Candidates keep a zero-credit record when nothing is left to share.
        let mut distribution_path = None;
        if ground_truth.has_data() && !candidates.is_empty() {
            let remaining_conversions = (ground_truth.conversions - explained.conversions).max(0.0);
            let remaining_revenue = (ground_truth.revenue - explained.revenue).max(0.0);
            let distribution = if remaining_conversions > 0.0 || remaining_revenue > 0.0 {
                let weights =
                    funnel_weights(&signals.funnel_position_data, self.settings.exclusive_flow_boost);
                let distribution = DistributionEngine::new(self.settings).distribute(
                    &DistributionInput {
                        remaining_conversions,
                        remaining_revenue,
                        candidates: &candidates,
                        daily_sessions: &daily_sessions,
                        daily_ground_truth: &daily_truth,
                        channel_weights: &weights,
                    },
                );
                distribution_path = Some(distribution.path);
                Some(distribution)
            } else {
                None
            };
            for (channel, sessions) in &candidates {
                records.push(self.distributed_record(
                    &inputs,
                    channel,
                    *sessions,
                    distribution.as_ref(),
                    remaining_conversions,
                ));
            }
        }

        // Tier 4: platforms nothing else explained.
        let explained_channels: BTreeSet<String> =
            records.iter().map(|r| r.channel.clone()).collect();
        let mut platform_records: Vec<ChannelAttribution> = inputs
            .platforms
            .iter()
            .filter(|(channel, _)| !explained_channels.contains(*channel))
            .filter(|(_, p)| p.conversions > 0.0 || p.spend > 0.0)
            .map(|(channel, p)| self.platform_record(&inputs, channel, p))
            .collect();
        if ground_truth.has_data() {
            let explained = totals(&records);
            cap_to(
                &mut platform_records,
                (ground_truth.conversions - explained.conversions).max(0.0),
                (ground_truth.revenue - explained.revenue).max(0.0),
            );
            // Claims capped to nothing carry no credit worth reporting.
            platform_records.retain(|r| r.conversions > 0.0 || r.revenue > 0.0);
        }
        records.extend(platform_records);

        // Over-claimed ground truth is cut from the weakest evidence first.
        if ground_truth.has_data() {
            reconcile(&mut records, ground_truth);
        }

        // Tier 5: direct / unattributed.
        if let Some(direct) = self.direct_record(&inputs, &records, ground_truth) {
            records.push(direct);
        }

        sort_attributions(&mut records);

        Resolution {
            attributions: records,
            ground_truth,
            distribution_path,
            has_time_decay_data,
        }
    }

    fn click_record(&self, inputs: &Inputs, channel: &str, click: &ClickTotals) -> ChannelAttribution {
        let types: Vec<&str> = click.click_id_types.iter().map(String::as_str).collect();
        let utm = inputs.channels.get(channel);
        ChannelAttribution {
            channel: channel.to_string(),
            platform: Some(channel.to_string()),
            medium: utm.and_then(|u| u.medium.clone()),
            campaign: utm.and_then(|u| u.campaign.clone()),
            conversions: click.conversions,
            revenue: click.revenue,
            confidence: signal_confidence(SignalType::ClickId, click.conversions),
            signal_type: SignalType::ClickId,
            data_quality: DataQuality::Verified,
            signals: inputs.availability(channel),
            explanation: format!(
                "{:.1} conversions ({:.2} revenue) verified by click identifiers ({}) on {}.",
                click.conversions,
                click.revenue,
                types.join(", "),
                channel
            ),
            is_estimated: false,
            estimation_reason: None,
        }
    }

    fn utm_record(&self, inputs: &Inputs, utm: &ChannelAggregate) -> ChannelAttribution {
        let signal_type = inputs.utm_signal_type(&utm.channel);
        let signals = inputs.availability(&utm.channel);
        let data_quality = if signal_type == SignalType::UtmWithSpend {
            DataQuality::Corroborated
        } else {
            DataQuality::SingleSource
        };
        ChannelAttribution {
            channel: utm.channel.clone(),
            platform: inputs.matched_platform(&utm.channel),
            medium: utm.medium.clone(),
            campaign: utm.campaign.clone(),
            conversions: utm.conversions,
            revenue: utm.revenue,
            confidence: signal_confidence(signal_type, utm.conversions),
            signal_type,
            data_quality,
            explanation: format!(
                "{:.1} conversions tracked on UTM-tagged sessions from {} ({} sessions, {}).",
                utm.conversions,
                utm.sources_label(),
                utm.sessions,
                spend_note(&signals)
            ),
            signals,
            is_estimated: false,
            estimation_reason: None,
        }
    }

    fn distributed_record(
        &self,
        inputs: &Inputs,
        channel: &str,
        sessions: u64,
        distribution: Option<&Distribution>,
        remaining_conversions: f64,
    ) -> ChannelAttribution {
        let signal_type = inputs.utm_signal_type(channel);
        let credit = distribution.map(|d| d.credit_for(channel)).unwrap_or_default();
        let utm = inputs.channels.get(channel);
        let sources = utm.map(|u| u.sources_label()).unwrap_or_else(|| channel.to_string());

        let (confidence, explanation, reason) = match distribution {
            Some(distribution) if credit.credit > 0.0 || credit.revenue > 0.0 => {
                let confidence = distribution.path.credited_confidence(signal_type, sessions);
                let explanation = match distribution.path {
                    DistributionPath::TimeDecay => format!(
                        "Estimated {:.1} of {:.1} unexplained ground-truth conversions from {} sessions ({}) active within {} days before conversions on {} day(s).",
                        credit.credit,
                        remaining_conversions,
                        sessions,
                        sources,
                        self.settings.lookback_days,
                        credit.matched_days
                    ),
                    DistributionPath::SessionShare => format!(
                        "Estimated {:.1} of {:.1} unexplained ground-truth conversions from this channel's share of weighted sessions ({} sessions from {}).",
                        credit.credit, remaining_conversions, sessions, sources
                    ),
                };
                let reason = format!(
                    "No directly tracked conversions; ground truth allocated by {} weighting.",
                    distribution.path.label()
                );
                (confidence, explanation, reason)
            }
            Some(_) => {
                let confidence = calculate_confidence(NO_PROXIMITY_BASE_CONFIDENCE, sessions as f64);
                let explanation = format!(
                    "{} sessions from {} had no temporal proximity to any ground-truth conversion.",
                    sessions, sources
                );
                let reason = "Sessions fell outside every conversion day's lookback window.".to_string();
                (confidence, explanation, reason)
            }
            None => {
                let confidence = calculate_confidence(NO_PROXIMITY_BASE_CONFIDENCE, sessions as f64);
                let explanation = format!(
                    "{} sessions from {} drove no tracked conversions; stronger signals already explain all ground-truth conversions.",
                    sessions, sources
                );
                let reason = "Ground truth fully explained before distribution.".to_string();
                (confidence, explanation, reason)
            }
        };

        ChannelAttribution {
            channel: channel.to_string(),
            platform: inputs.matched_platform(channel),
            medium: utm.and_then(|u| u.medium.clone()),
            campaign: utm.and_then(|u| u.campaign.clone()),
            conversions: credit.credit,
            revenue: credit.revenue,
            confidence,
            signal_type,
            data_quality: DataQuality::Estimated,
            signals: inputs.availability(channel),
            explanation,
            is_estimated: true,
            estimation_reason: Some(reason),
        }
    }

    fn platform_record(
        &self,
        inputs: &Inputs,
        channel: &str,
        platform: &PlatformMetrics,
    ) -> ChannelAttribution {
        ChannelAttribution {
            channel: channel.to_string(),
            platform: Some(channel.to_string()),
            medium: None,
            campaign: None,
            conversions: platform.conversions,
            revenue: platform.revenue,
            confidence: signal_confidence(SignalType::PlatformOnly, platform.conversions),
            signal_type: SignalType::PlatformOnly,
            data_quality: DataQuality::SingleSource,
            signals: inputs.availability(channel),
            explanation: format!(
                "{} self-reports {:.1} conversions on {:.2} spend; not corroborated by tag or click-id data.",
                channel, platform.conversions, platform.spend
            ),
            is_estimated: false,
            estimation_reason: None,
        }
    }

    fn direct_record(
        &self,
        inputs: &Inputs,
        records: &[ChannelAttribution],
        ground_truth: GroundTruth,
    ) -> Option<ChannelAttribution> {
        let tracked = inputs.channels.get(DIRECT_CHANNEL);
        let (conversions, revenue, explanation) = if ground_truth.has_data() {
            let attributed = totals(records);
            let conversions = ground_truth.conversions - attributed.conversions;
            let revenue = ground_truth.revenue - attributed.revenue;
            if conversions <= self.settings.direct_conversion_threshold
                && revenue <= self.settings.direct_revenue_threshold
            {
                return None;
            }
            let conversions = conversions.max(0.0);
            let revenue = revenue.max(0.0);
            (
                conversions,
                revenue,
                format!(
                    "{:.1} ground-truth conversions ({:.2} revenue) could not be matched to any tracked channel.",
                    conversions, revenue
                ),
            )
        } else {
            let utm = tracked.filter(|u| u.conversions > 0.0)?;
            (
                utm.conversions,
                utm.revenue,
                format!(
                    "{:.1} conversions tracked from direct or untagged traffic ({} sessions).",
                    utm.conversions, utm.sessions
                ),
            )
        };

        Some(ChannelAttribution {
            channel: DIRECT_CHANNEL.to_string(),
            platform: None,
            medium: None,
            campaign: None,
            conversions,
            revenue,
            confidence: signal_confidence(SignalType::Direct, conversions),
            signal_type: SignalType::Direct,
            data_quality: DataQuality::Estimated,
            signals: SignalAvailability {
                utm_sessions: tracked.map_or(0, |u| u.sessions),
                utm_conversions: tracked.map_or(0.0, |u| u.conversions),
                has_tag_data: tracked.map_or(false, |u| u.sessions > 0),
                ..Default::default()
            },
            explanation,
            is_estimated: false,
            estimation_reason: None,
        })
    }
}

fn totals(records: &[ChannelAttribution]) -> GroundTruth {
    records.iter().fold(GroundTruth::default(), |acc, r| GroundTruth {
        conversions: acc.conversions + r.conversions,
        revenue: acc.revenue + r.revenue,
    })
}

const SCALED_NOTE: &str = " Scaled down to reconcile with ground-truth totals.";

/// Scale `records` down so they sum to at most the given caps.
fn cap_to(records: &mut [ChannelAttribution], max_conversions: f64, max_revenue: f64) {
    let claimed = totals(records);
    let conversion_scale = if claimed.conversions > max_conversions && claimed.conversions > 0.0 {
        max_conversions / claimed.conversions
    } else {
        1.0
    };
    let revenue_scale = if claimed.revenue > max_revenue && claimed.revenue > 0.0 {
        max_revenue / claimed.revenue
    } else {
        1.0
    };
    if conversion_scale >= 1.0 && revenue_scale >= 1.0 {
        return;
    }
    for record in records.iter_mut() {
        record.conversions *= conversion_scale;
        record.revenue *= revenue_scale;
        record.explanation.push_str(SCALED_NOTE);
    }
}

/// Lower value = cut first when claims exceed ground truth.
fn reconcile_rank(record: &ChannelAttribution) -> u8 {
    match record.signal_type {
        SignalType::PlatformOnly => 0,
        SignalType::ClickId => 3,
        _ if record.is_estimated => 1,
        _ => 2,
    }
}

fn reconcile(records: &mut [ChannelAttribution], ground_truth: GroundTruth) {
    const TOLERANCE: f64 = 1e-6;
    for rank in 0..=3u8 {
        let claimed = totals(records);
        let excess_conversions = (claimed.conversions - ground_truth.conversions).max(0.0);
        let excess_revenue = (claimed.revenue - ground_truth.revenue).max(0.0);
        if excess_conversions <= TOLERANCE && excess_revenue <= TOLERANCE {
            return;
        }

        let tier: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| reconcile_rank(r) == rank)
            .map(|(i, _)| i)
            .collect();
        let tier_totals = tier.iter().fold(GroundTruth::default(), |acc, &i| GroundTruth {
            conversions: acc.conversions + records[i].conversions,
            revenue: acc.revenue + records[i].revenue,
        });

        let conversion_scale = if excess_conversions > TOLERANCE && tier_totals.conversions > 0.0 {
            ((tier_totals.conversions - excess_conversions) / tier_totals.conversions).max(0.0)
        } else {
            1.0
        };
        let revenue_scale = if excess_revenue > TOLERANCE && tier_totals.revenue > 0.0 {
            ((tier_totals.revenue - excess_revenue) / tier_totals.revenue).max(0.0)
        } else {
            1.0
        };
        if conversion_scale >= 1.0 && revenue_scale >= 1.0 {
            continue;
        }

        debug!(rank, conversion_scale, revenue_scale, "Reconciling over-claimed ground truth");
        for i in tier {
            records[i].conversions *= conversion_scale;
            records[i].revenue *= revenue_scale;
            records[i].explanation.push_str(SCALED_NOTE);
        }
    }
}

/// Revenue desc, then confidence desc, then conversions desc.
pub fn sort_attributions(records: &mut [ChannelAttribution]) {
    records.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| b.confidence.cmp(&a.confidence))
            .then_with(|| b.conversions.total_cmp(&a.conversions))
            .then_with(|| a.channel.cmp(&b.channel))
    });
}
