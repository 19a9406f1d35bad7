//! Channel normalization: maps raw tag sources and platform names onto
//! canonical channel keys and merges rows that land on the same key.
//!
//! The same `normalize` is applied to UTM sources, platform identifiers,
//! click-level platforms and funnel channel names, so every input agrees on
//! what a channel is called.

use attribution_core::signals::{
    DailyPlatformMetrics, DailyUtmPerformance, PlatformMetrics, UtmPerformance,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Synthetic channel for untagged traffic and unexplained ground truth.
pub const DIRECT_CHANNEL: &str = "direct";

/// Raw source (lower-cased) -> canonical platform.
const PLATFORM_ALIASES: &[(&str, &str)] = &[
    ("facebook", "facebook"),
    ("fb", "facebook"),
    ("meta", "facebook"),
    ("instagram", "facebook"),
    ("ig", "facebook"),
    ("facebook.com", "facebook"),
    ("instagram.com", "facebook"),
    ("meta_ads", "facebook"),
    ("google", "google"),
    ("google_ads", "google"),
    ("googleads", "google"),
    ("adwords", "google"),
    ("gads", "google"),
    ("microsoft", "microsoft"),
    ("bing", "microsoft"),
    ("bing_ads", "microsoft"),
    ("microsoft_ads", "microsoft"),
    ("msads", "microsoft"),
    ("tiktok", "tiktok"),
    ("tiktok_ads", "tiktok"),
    ("tt", "tiktok"),
    ("linkedin", "linkedin"),
    ("linkedin_ads", "linkedin"),
    ("li", "linkedin"),
    ("pinterest", "pinterest"),
    ("snapchat", "snapchat"),
    ("twitter", "twitter"),
    ("x", "twitter"),
    ("reddit", "reddit"),
];

/// Result of normalizing one raw source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSource {
    pub channel: String,
    pub platform: Option<&'static str>,
    pub is_direct: bool,
}

pub fn platform_alias(source: &str) -> Option<&'static str> {
    PLATFORM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == source)
        .map(|(_, platform)| *platform)
}

pub fn normalize(source: &str) -> NormalizedSource {
    let lowered = source.trim().to_lowercase();
    if lowered.is_empty() || lowered == "(direct)" || lowered == DIRECT_CHANNEL {
        return NormalizedSource {
            channel: DIRECT_CHANNEL.to_string(),
            platform: None,
            is_direct: true,
        };
    }
    match platform_alias(&lowered) {
        Some(platform) => NormalizedSource {
            channel: platform.to_string(),
            platform: Some(platform),
            is_direct: false,
        },
        None => NormalizedSource {
            channel: lowered,
            platform: None,
            is_direct: false,
        },
    }
}

/// `None` sources are direct traffic.
pub fn normalize_opt(source: Option<&str>) -> NormalizedSource {
    normalize(source.unwrap_or(""))
}

/// Canonical key only.
pub fn channel_key(source: &str) -> String {
    normalize(source).channel
}

/// UTM rows merged under one channel key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAggregate {
    pub channel: String,
    pub platform: Option<&'static str>,
    pub is_direct: bool,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub sessions: u64,
    pub conversions: f64,
    pub revenue: f64,
    /// Original source strings, in first-seen order.
    pub sources: Vec<String>,
}

impl ChannelAggregate {
    fn empty(normalized: NormalizedSource) -> Self {
        Self {
            channel: normalized.channel,
            platform: normalized.platform,
            is_direct: normalized.is_direct,
            medium: None,
            campaign: None,
            sessions: 0,
            conversions: 0.0,
            revenue: 0.0,
            sources: Vec::new(),
        }
    }

    fn absorb(
        &mut self,
        raw_source: &str,
        medium: Option<&String>,
        campaign: Option<&String>,
        sessions: u64,
        conversions: f64,
        revenue: f64,
    ) {
        self.sessions += sessions;
        self.conversions += conversions.max(0.0);
        self.revenue += revenue.max(0.0);
        if self.medium.is_none() {
            self.medium = medium.cloned();
        }
        if self.campaign.is_none() {
            self.campaign = campaign.cloned();
        }
        if !self.sources.iter().any(|s| s == raw_source) {
            self.sources.push(raw_source.to_string());
        }
    }

    pub fn sources_label(&self) -> String {
        self.sources.join(", ")
    }
}

pub fn aggregate_utm(rows: &[UtmPerformance]) -> BTreeMap<String, ChannelAggregate> {
    let mut channels: BTreeMap<String, ChannelAggregate> = BTreeMap::new();
    for row in rows {
        let normalized = normalize_opt(row.utm_source.as_deref());
        let raw = row.utm_source.clone().unwrap_or_else(|| "(direct)".to_string());
        channels
            .entry(normalized.channel.clone())
            .or_insert_with(|| ChannelAggregate::empty(normalized))
            .absorb(
                &raw,
                row.utm_medium.as_ref(),
                row.utm_campaign.as_ref(),
                row.sessions,
                row.conversions,
                row.revenue,
            );
    }
    channels
}

/// Per-day, per-channel tag totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyChannelTotals {
    pub sessions: u64,
    pub conversions: f64,
    pub revenue: f64,
}

pub type DailyChannels = BTreeMap<NaiveDate, BTreeMap<String, DailyChannelTotals>>;

pub fn aggregate_daily_utm(rows: &[DailyUtmPerformance]) -> DailyChannels {
    let mut days: DailyChannels = BTreeMap::new();
    for row in rows {
        let key = normalize_opt(row.utm_source.as_deref()).channel;
        let totals = days.entry(row.date).or_default().entry(key).or_default();
        totals.sessions += row.sessions;
        totals.conversions += row.conversions.max(0.0);
        totals.revenue += row.revenue.max(0.0);
    }
    days
}

/// Platform metrics summed under their normalized key.
pub fn aggregate_platforms(rows: &[PlatformMetrics]) -> BTreeMap<String, PlatformMetrics> {
    let mut platforms: BTreeMap<String, PlatformMetrics> = BTreeMap::new();
    for row in rows {
        let key = channel_key(&row.platform);
        let entry = platforms.entry(key.clone()).or_insert_with(|| PlatformMetrics {
            platform: key,
            ..Default::default()
        });
        entry.spend += row.spend.max(0.0);
        entry.impressions += row.impressions;
        entry.clicks += row.clicks;
        entry.conversions += row.conversions.max(0.0);
        entry.revenue += row.revenue.max(0.0);
    }
    platforms
}

pub fn aggregate_daily_platforms(
    rows: &[DailyPlatformMetrics],
) -> BTreeMap<NaiveDate, BTreeMap<String, PlatformMetrics>> {
    let mut days: BTreeMap<NaiveDate, BTreeMap<String, PlatformMetrics>> = BTreeMap::new();
    for row in rows {
        let key = channel_key(&row.platform);
        let entry = days
            .entry(row.date)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| PlatformMetrics {
                platform: key,
                ..Default::default()
            });
        entry.spend += row.spend.max(0.0);
        entry.impressions += row.impressions;
        entry.clicks += row.clicks;
        entry.conversions += row.conversions.max(0.0);
        entry.revenue += row.revenue.max(0.0);
    }
    days
}
