//! Rows returned by the signal collectors for one `(org, start, end)` window.
//!
//! Monetary values are already converted from minor units to currency units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ad-platform self-reported totals for the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetrics {
    pub platform: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlatformMetrics {
    pub date: NaiveDate,
    pub platform: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub revenue: f64,
}

/// Tag-tracked session performance keyed by raw `utm_source`.
/// A `None`/empty source is direct traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmPerformance {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub sessions: u64,
    pub conversions: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUtmPerformance {
    pub date: NaiveDate,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub sessions: u64,
    pub conversions: f64,
    pub revenue: f64,
}

/// Ground-truth conversions from a payment, commerce or field-service connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRevenue {
    pub source: String,
    pub conversions: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyConnectorRevenue {
    pub date: NaiveDate,
    pub source: String,
    pub conversions: f64,
    pub revenue: f64,
}

/// Pre-computed click-identifier attribution row. Only `last_touch` rows
/// are counted so the same conversion is never summed across models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickLevelAttribution {
    pub platform: String,
    pub click_id_type: String,
    pub model: String,
    pub revenue: f64,
    pub conversions: f64,
    pub credit_percent: f64,
}

impl ClickLevelAttribution {
    pub const LAST_TOUCH: &'static str = "last_touch";

    pub fn is_last_touch(&self) -> bool {
        self.model.eq_ignore_ascii_case(Self::LAST_TOUCH)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickIdStats {
    pub has_click_ids: bool,
    pub click_id_count: u64,
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
}

/// Visitors reaching one funnel step, broken down by channel.
/// Used only as a weighting input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelPositionData {
    pub goal_id: String,
    pub funnel_position: u32,
    pub conversion_rate: f64,
    pub visitor_count: u64,
    #[serde(default)]
    pub by_channel: BTreeMap<String, u64>,
    pub flow_tag: Option<String>,
    #[serde(default)]
    pub is_exclusive: bool,
}
