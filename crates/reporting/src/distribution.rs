//! Probabilistic allocation of ground truth that no direct signal explains.
//!
//! Two paths:
//! - time decay: each ground-truth day credits channels by their sessions on
//!   that day and the `lookback_days` before it, weighted `e^(-k ln2 / half_life)`;
//! - session share: flat split by funnel-weighted session counts, used when
//!   daily data is too thin for time decay.

use attribution_core::config::AttributionSettings;
use attribution_core::signals::{DailyConnectorRevenue, FunnelPositionData};
use attribution_core::types::SignalType;
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

use crate::channels::{channel_key, DailyChannels};
use crate::confidence::calculate_confidence;

/// Base confidence for channels with sessions but no decayed share.
pub const NO_PROXIMITY_BASE_CONFIDENCE: u8 = 50;

/// Floor for channels that received estimated credit.
pub const MIN_DISTRIBUTED_CONFIDENCE: u8 = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionPath {
    TimeDecay,
    SessionShare,
}

impl DistributionPath {
    /// Confidence ceiling for estimated credit, below direct UTM matches.
    pub fn base_confidence(self, signal_type: SignalType) -> u8 {
        let (with_spend, no_spend, unmatched) = match self {
            DistributionPath::TimeDecay => (80, 75, 70),
            DistributionPath::SessionShare => (75, 70, 65),
        };
        match signal_type {
            SignalType::UtmWithSpend => with_spend,
            SignalType::UtmNoSpend => no_spend,
            _ => unmatched,
        }
    }

    /// Sample-size discounted confidence, kept inside the estimated band.
    pub fn credited_confidence(self, signal_type: SignalType, sessions: u64) -> u8 {
        calculate_confidence(self.base_confidence(signal_type), sessions as f64)
            .max(MIN_DISTRIBUTED_CONFIDENCE)
    }

    pub fn label(self) -> &'static str {
        match self {
            DistributionPath::TimeDecay => "time-decay",
            DistributionPath::SessionShare => "session-share",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelCredit {
    pub credit: f64,
    pub revenue: f64,
    /// Ground-truth days on which the channel had a non-zero decayed share.
    pub matched_days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub path: DistributionPath,
    pub credits: BTreeMap<String, ChannelCredit>,
}

impl Distribution {
    pub fn credit_for(&self, channel: &str) -> ChannelCredit {
        self.credits.get(channel).copied().unwrap_or_default()
    }
}

/// Inputs for one distribution run. `candidates` maps channel -> window sessions.
pub struct DistributionInput<'a> {
    pub remaining_conversions: f64,
    pub remaining_revenue: f64,
    pub candidates: &'a BTreeMap<String, u64>,
    pub daily_sessions: &'a DailyChannels,
    pub daily_ground_truth: &'a BTreeMap<NaiveDate, GroundTruthDay>,
    /// Funnel multiplier per channel; channels absent here weigh 1.0.
    pub channel_weights: &'a BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundTruthDay {
    pub conversions: f64,
    pub revenue: f64,
}

pub fn daily_ground_truth(rows: &[DailyConnectorRevenue]) -> BTreeMap<NaiveDate, GroundTruthDay> {
    let mut days: BTreeMap<NaiveDate, GroundTruthDay> = BTreeMap::new();
    for row in rows {
        let day = days.entry(row.date).or_default();
        day.conversions += row.conversions.max(0.0);
        day.revenue += row.revenue.max(0.0);
    }
    days
}

/// Weight of sessions `days_prior` days before a conversion.
pub fn decay_weight(days_prior: u32, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return if days_prior == 0 { 1.0 } else { 0.0 };
    }
    (-(f64::from(days_prior)) * std::f64::consts::LN_2 / half_life_days).exp()
}

/// Time decay needs at least two ground-truth days and some daily session data.
pub fn time_decay_eligible(
    daily_ground_truth: &BTreeMap<NaiveDate, GroundTruthDay>,
    daily_sessions: &DailyChannels,
) -> bool {
    let conversion_days = daily_ground_truth
        .values()
        .filter(|d| d.conversions > 0.0)
        .count();
    let has_sessions = daily_sessions
        .values()
        .any(|channels| channels.values().any(|c| c.sessions > 0));
    conversion_days >= 2 && has_sessions
}

/// Funnel weighting: `(1 + sum(position x conversion_rate)) x exclusive_boost`
/// per channel, keyed by normalized channel.
pub fn funnel_weights(
    funnel: &[FunnelPositionData],
    exclusive_flow_boost: f64,
) -> BTreeMap<String, f64> {
    let mut bonus: BTreeMap<String, f64> = BTreeMap::new();
    let mut exclusive: BTreeSet<String> = BTreeSet::new();

    for step in funnel {
        for (channel, visitors) in &step.by_channel {
            if *visitors == 0 {
                continue;
            }
            let key = channel_key(channel);
            *bonus.entry(key.clone()).or_insert(0.0) +=
                f64::from(step.funnel_position) * step.conversion_rate.max(0.0);
            if step.is_exclusive {
                exclusive.insert(key);
            }
        }
    }

    bonus
        .into_iter()
        .map(|(channel, bonus)| {
            let boost = if exclusive.contains(&channel) {
                exclusive_flow_boost
            } else {
                1.0
            };
            (channel, (1.0 + bonus) * boost)
        })
        .collect()
}

pub struct DistributionEngine<'a> {
    settings: &'a AttributionSettings,
}

impl<'a> DistributionEngine<'a> {
    pub fn new(settings: &'a AttributionSettings) -> Self {
        Self { settings }
    }

    pub fn distribute(&self, input: &DistributionInput<'_>) -> Distribution {
        if time_decay_eligible(input.daily_ground_truth, input.daily_sessions) {
            if let Some(credits) = self.time_decay(input) {
                return Distribution {
                    path: DistributionPath::TimeDecay,
                    credits,
                };
            }
        }
        Distribution {
            path: DistributionPath::SessionShare,
            credits: self.session_share(input),
        }
    }

    fn weight_of(&self, input: &DistributionInput<'_>, channel: &str) -> f64 {
        input.channel_weights.get(channel).copied().unwrap_or(1.0)
    }

    /// `None` when no ground-truth day had any session within its lookback.
    fn time_decay(&self, input: &DistributionInput<'_>) -> Option<BTreeMap<String, ChannelCredit>> {
        let mut credits: BTreeMap<String, ChannelCredit> = input
            .candidates
            .keys()
            .map(|c| (c.clone(), ChannelCredit::default()))
            .collect();

        for (day, truth) in input.daily_ground_truth {
            if truth.conversions <= 0.0 && truth.revenue <= 0.0 {
                continue;
            }

            let mut weighted: BTreeMap<&str, f64> = BTreeMap::new();
            for k in 0..=self.settings.lookback_days {
                let Some(session_day) = day.checked_sub_days(Days::new(u64::from(k))) else {
                    break;
                };
                let Some(channels) = input.daily_sessions.get(&session_day) else {
                    continue;
                };
                let w = decay_weight(k, self.settings.half_life_days);
                for channel in input.candidates.keys() {
                    if let Some(totals) = channels.get(channel) {
                        if totals.sessions > 0 {
                            *weighted.entry(channel.as_str()).or_insert(0.0) +=
                                totals.sessions as f64 * w * self.weight_of(input, channel);
                        }
                    }
                }
            }

            let total: f64 = weighted.values().sum();
            if total <= 0.0 {
                continue;
            }
            for (channel, value) in weighted {
                if value <= 0.0 {
                    continue;
                }
                let share = value / total;
                if let Some(entry) = credits.get_mut(channel) {
                    entry.credit += truth.conversions * share;
                    entry.revenue += truth.revenue * share;
                    entry.matched_days += 1;
                }
            }
        }

        let raw_credit: f64 = credits.values().map(|c| c.credit).sum();
        let raw_revenue: f64 = credits.values().map(|c| c.revenue).sum();
        if raw_credit <= 0.0 && raw_revenue <= 0.0 {
            return None;
        }

        // Rescale so the run explains exactly the remaining ground truth.
        for entry in credits.values_mut() {
            let credit_share = if raw_credit > 0.0 {
                entry.credit / raw_credit
            } else {
                entry.revenue / raw_revenue
            };
            entry.credit = input.remaining_conversions * credit_share;
            entry.revenue = if raw_revenue > 0.0 {
                input.remaining_revenue * entry.revenue / raw_revenue
            } else {
                input.remaining_revenue * credit_share
            };
        }

        Some(credits)
    }

    fn session_share(&self, input: &DistributionInput<'_>) -> BTreeMap<String, ChannelCredit> {
        let weights: BTreeMap<&String, f64> = input
            .candidates
            .iter()
            .map(|(channel, sessions)| (channel, *sessions as f64 * self.weight_of(input, channel)))
            .collect();
        let total: f64 = weights.values().sum();

        weights
            .into_iter()
            .map(|(channel, weight)| {
                let share = if total > 0.0 { weight / total } else { 0.0 };
                (
                    channel.clone(),
                    ChannelCredit {
                        credit: input.remaining_conversions * share,
                        revenue: input.remaining_revenue * share,
                        matched_days: 0,
                    },
                )
            })
            .collect()
    }
}
