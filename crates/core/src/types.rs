use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One attribution computation: an org and an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRequest {
    pub org_id: String,
    /// Tag identifier used by the session-tracking tables.
    pub org_tag: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AttributionRequest {
    pub fn new(org_id: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        let org_id = org_id.into();
        Self {
            org_tag: org_id.clone(),
            org_id,
            start_date,
            end_date,
        }
    }

    pub fn with_org_tag(mut self, org_tag: impl Into<String>) -> Self {
        self.org_tag = org_tag.into();
        self
    }

    pub fn cache_key(&self) -> String {
        format!(
            "attribution:{}:{}:{}",
            self.org_id, self.start_date, self.end_date
        )
    }

    /// Every day in the window, inclusive.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .collect()
    }
}

/// Which evidence explained a channel's conversions, highest confidence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    ClickId,
    UtmWithSpend,
    UtmNoSpend,
    UtmOnly,
    PlatformOnly,
    Direct,
}

impl SignalType {
    /// Ceiling confidence before sample-size adjustment.
    pub fn base_confidence(self) -> u8 {
        match self {
            SignalType::ClickId => 100,
            SignalType::UtmWithSpend => 95,
            SignalType::UtmNoSpend => 90,
            SignalType::UtmOnly => 85,
            SignalType::PlatformOnly => 70,
            SignalType::Direct => 0,
        }
    }

    /// Whether conversions of this type are backed by first-party signals.
    pub fn is_first_party(self) -> bool {
        !matches!(self, SignalType::PlatformOnly | SignalType::Direct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Verified,
    Corroborated,
    SingleSource,
    Estimated,
}

/// Which signal types were observed for a channel, and how much of each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalAvailability {
    pub has_click_ids: bool,
    pub click_id_conversions: f64,
    pub has_utm_match: bool,
    pub utm_sessions: u64,
    pub utm_conversions: f64,
    pub has_active_spend: bool,
    pub platform_spend: f64,
    pub has_platform_data: bool,
    pub platform_conversions: f64,
    pub has_tag_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAttribution {
    pub channel: String,
    pub platform: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub conversions: f64,
    pub revenue: f64,
    pub confidence: u8,
    pub signal_type: SignalType,
    pub data_quality: DataQuality,
    pub signals: SignalAvailability,
    pub explanation: String,
    pub is_estimated: bool,
    pub estimation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBreakdownEntry {
    pub signal_type: SignalType,
    pub conversions: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionSummary {
    pub total_conversions: f64,
    pub total_revenue: f64,
    pub total_spend: f64,
    /// `total_revenue / total_spend` (0.0 when spend is zero).
    pub blended_roas: f64,
    pub channel_count: usize,
    /// Conversion-weighted mean confidence.
    pub average_confidence: f64,
    pub signal_breakdown: Vec<SignalBreakdownEntry>,
    /// Percentage of conversions backed by first-party signals.
    pub data_completeness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChannelPoint {
    pub channel: String,
    pub sessions: u64,
    pub conversions: f64,
    pub revenue: f64,
    pub spend: f64,
    /// True when the values came from platform self-reporting.
    pub platform_reported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub total_conversions: f64,
    pub total_revenue: f64,
    pub utm_conversions: f64,
    pub utm_revenue: f64,
    pub connector_conversions: f64,
    pub connector_revenue: f64,
    pub spend: f64,
    pub by_channel: Vec<DailyChannelPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityReport {
    pub has_platform_data: bool,
    pub has_tag_data: bool,
    pub has_click_ids: bool,
    pub has_connector_data: bool,
    pub has_time_decay_data: bool,
    pub click_id_count: u64,
    pub failed_collectors: Vec<String>,
    pub recommendations: Vec<String>,
}

/// The only value returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionReport {
    pub org_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub attributions: Vec<ChannelAttribution>,
    pub summary: AttributionSummary,
    pub time_series: Vec<TimeSeriesPoint>,
    pub data_quality: DataQualityReport,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_cache_key_and_days() {
        let req = AttributionRequest::new("org_1", date("2024-03-01"), date("2024-03-03"));
        assert_eq!(req.cache_key(), "attribution:org_1:2024-03-01:2024-03-03");
        assert_eq!(req.org_tag, "org_1");
        assert_eq!(req.days().len(), 3);
        assert_eq!(req.clone().with_org_tag("tag_9").org_tag, "tag_9");
    }

    #[test]
    fn test_signal_type_serializes_snake_case() {
        let json = serde_json::to_string(&SignalType::ClickId).unwrap();
        assert_eq!(json, "\"click_id\"");
        assert!(!SignalType::Direct.is_first_party());
        assert!(SignalType::UtmOnly.is_first_party());
    }

    #[test]
    fn test_channel_attribution_uses_camel_case_fields() {
        let record = ChannelAttribution {
            channel: "google".into(),
            platform: Some("google".into()),
            medium: None,
            campaign: None,
            conversions: 1.0,
            revenue: 10.0,
            confidence: 100,
            signal_type: SignalType::ClickId,
            data_quality: DataQuality::Verified,
            signals: SignalAvailability::default(),
            explanation: String::new(),
            is_estimated: false,
            estimation_reason: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["signalType"], "click_id");
        assert_eq!(value["dataQuality"], "verified");
        assert_eq!(value["isEstimated"], false);
        assert!(value["signals"].get("hasClickIds").is_some());
    }
}
