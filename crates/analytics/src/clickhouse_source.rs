//! ClickHouse-backed signal collectors.
//!
//! Every query is read-only and scoped to one org and an inclusive date range.
//! Money is stored in minor units and converted to currency units here.

use async_trait::async_trait;
use attribution_core::config::ClickHouseConfig;
use attribution_core::signals::{
    ClickIdStats, ClickLevelAttribution, ConnectorRevenue, DailyConnectorRevenue,
    DailyPlatformMetrics, DailyUtmPerformance, FunnelPositionData, PlatformMetrics,
    UtmPerformance,
};
use attribution_core::types::AttributionRequest;
use attribution_core::{AttributionError, AttributionResult};
use chrono::NaiveDate;
use clickhouse::Row;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::source::SignalSource;

/// Connector event statuses that count as ground truth.
const COUNTED_STATUSES: &str = "('succeeded', 'paid', 'completed', 'active')";

pub struct ClickHouseSource {
    client: clickhouse::Client,
}

impl ClickHouseSource {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        info!(url = %config.url, database = %config.database, "ClickHouse signal source configured");

        Self { client }
    }

    async fn fetch<T>(
        &self,
        collector: &'static str,
        sql: &str,
        binds: &[&str],
    ) -> AttributionResult<Vec<T>>
    where
        T: Row + for<'de> Deserialize<'de>,
    {
        let mut query = self.client.query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        query
            .fetch_all::<T>()
            .await
            .map_err(|e| AttributionError::collector(collector, e))
    }
}

pub(crate) fn cents_to_currency(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a `YYYY-MM-DD` column; rows that fail are skipped by the caller.
fn parse_date(collector: &'static str, raw: &str) -> Option<NaiveDate> {
    match raw.parse::<NaiveDate>() {
        Ok(date) => Some(date),
        Err(e) => {
            metrics::counter!("attribution.rows.skipped", "collector" => collector).increment(1);
            warn!(collector = collector, value = raw, error = %e, "Skipping row with unparseable date");
            None
        }
    }
}

// ─── Row types ──────────────────────────────────────────────────────────────

#[derive(Debug, Row, Deserialize)]
struct PlatformMetricsRow {
    platform: String,
    spend_cents: i64,
    impressions: u64,
    clicks: u64,
    conversions: f64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct DailyPlatformMetricsRow {
    date: String,
    platform: String,
    spend_cents: i64,
    impressions: u64,
    clicks: u64,
    conversions: f64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct UtmRow {
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    sessions: u64,
    conversions: f64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct DailyUtmRow {
    date: String,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    sessions: u64,
    conversions: f64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct ConnectorRow {
    source: String,
    conversions: u64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct DailyConnectorRow {
    date: String,
    source: String,
    conversions: u64,
    revenue_cents: i64,
}

#[derive(Debug, Row, Deserialize)]
struct ClickAttributionRow {
    platform: String,
    click_id_type: String,
    model: String,
    revenue_cents: i64,
    conversions: f64,
    credit_percent: f64,
}

#[derive(Debug, Row, Deserialize)]
struct ClickIdTypeRow {
    click_id_type: String,
    click_ids: u64,
}

/// Funnel snapshot as stored; `by_channel` is a JSON object of channel -> visitors.
#[derive(Debug, Clone, Row, Deserialize)]
pub struct FunnelRow {
    pub goal_id: String,
    pub funnel_position: u32,
    pub conversion_rate: f64,
    pub visitor_count: u64,
    pub by_channel: String,
    pub flow_tag: Option<String>,
    pub is_exclusive: u8,
}

impl FunnelRow {
    pub fn parse(self) -> AttributionResult<FunnelPositionData> {
        let by_channel: BTreeMap<String, u64> = if self.by_channel.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.by_channel).map_err(|e| {
                AttributionError::MalformedRow(format!(
                    "funnel goal {} position {}: by_channel: {e}",
                    self.goal_id, self.funnel_position
                ))
            })?
        };

        Ok(FunnelPositionData {
            goal_id: self.goal_id,
            funnel_position: self.funnel_position,
            conversion_rate: self.conversion_rate,
            visitor_count: self.visitor_count,
            by_channel,
            flow_tag: non_empty(self.flow_tag),
            is_exclusive: self.is_exclusive != 0,
        })
    }
}

/// Parse funnel rows, skipping malformed ones.
pub fn parse_funnel_rows(rows: Vec<FunnelRow>) -> Vec<FunnelPositionData> {
    rows.into_iter()
        .filter_map(|row| match row.parse() {
            Ok(data) => Some(data),
            Err(e) => {
                metrics::counter!("attribution.rows.skipped", "collector" => "funnel_position_data")
                    .increment(1);
                warn!(error = %e, "Skipping malformed funnel row");
                None
            }
        })
        .collect()
}

// ─── Queries ────────────────────────────────────────────────────────────────

#[async_trait]
impl SignalSource for ClickHouseSource {
    async fn platform_metrics(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<PlatformMetrics>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<PlatformMetricsRow> = self
            .fetch(
                "platform_metrics",
                "SELECT platform,
                        toInt64(sum(spend_cents)) AS spend_cents,
                        toUInt64(sum(impressions)) AS impressions,
                        toUInt64(sum(clicks)) AS clicks,
                        toFloat64(sum(conversions)) AS conversions,
                        toInt64(sum(conversion_value_cents)) AS revenue_cents
                 FROM ad_platform_daily_metrics
                 WHERE org_id = ? AND metric_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY platform",
                &[&request.org_id, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| PlatformMetrics {
                platform: r.platform,
                spend: cents_to_currency(r.spend_cents),
                impressions: r.impressions,
                clicks: r.clicks,
                conversions: r.conversions,
                revenue: cents_to_currency(r.revenue_cents),
            })
            .collect())
    }

    async fn daily_platform_metrics(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyPlatformMetrics>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<DailyPlatformMetricsRow> = self
            .fetch(
                "daily_platform_metrics",
                "SELECT toString(metric_date) AS date,
                        platform,
                        toInt64(sum(spend_cents)) AS spend_cents,
                        toUInt64(sum(impressions)) AS impressions,
                        toUInt64(sum(clicks)) AS clicks,
                        toFloat64(sum(conversions)) AS conversions,
                        toInt64(sum(conversion_value_cents)) AS revenue_cents
                 FROM ad_platform_daily_metrics
                 WHERE org_id = ? AND metric_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY metric_date, platform
                 ORDER BY metric_date",
                &[&request.org_id, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(DailyPlatformMetrics {
                    date: parse_date("daily_platform_metrics", &r.date)?,
                    platform: r.platform,
                    spend: cents_to_currency(r.spend_cents),
                    impressions: r.impressions,
                    clicks: r.clicks,
                    conversions: r.conversions,
                    revenue: cents_to_currency(r.revenue_cents),
                })
            })
            .collect())
    }

    async fn utm_performance(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<UtmPerformance>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<UtmRow> = self
            .fetch(
                "utm_performance",
                "SELECT nullIf(ifNull(utm_source, ''), '') AS utm_source,
                        any(utm_medium) AS utm_medium,
                        any(utm_campaign) AS utm_campaign,
                        count() AS sessions,
                        toFloat64(sum(conversions)) AS conversions,
                        toInt64(sum(revenue_cents)) AS revenue_cents
                 FROM tag_sessions
                 WHERE org_tag = ? AND session_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY utm_source",
                &[&request.org_tag, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| UtmPerformance {
                utm_source: non_empty(r.utm_source),
                utm_medium: non_empty(r.utm_medium),
                utm_campaign: non_empty(r.utm_campaign),
                sessions: r.sessions,
                conversions: r.conversions,
                revenue: cents_to_currency(r.revenue_cents),
            })
            .collect())
    }

    async fn daily_utm_performance(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyUtmPerformance>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<DailyUtmRow> = self
            .fetch(
                "daily_utm_performance",
                "SELECT toString(session_date) AS date,
                        nullIf(ifNull(utm_source, ''), '') AS utm_source,
                        any(utm_medium) AS utm_medium,
                        any(utm_campaign) AS utm_campaign,
                        count() AS sessions,
                        toFloat64(sum(conversions)) AS conversions,
                        toInt64(sum(revenue_cents)) AS revenue_cents
                 FROM tag_sessions
                 WHERE org_tag = ? AND session_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY session_date, utm_source
                 ORDER BY session_date",
                &[&request.org_tag, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(DailyUtmPerformance {
                    date: parse_date("daily_utm_performance", &r.date)?,
                    utm_source: non_empty(r.utm_source),
                    utm_medium: non_empty(r.utm_medium),
                    utm_campaign: non_empty(r.utm_campaign),
                    sessions: r.sessions,
                    conversions: r.conversions,
                    revenue: cents_to_currency(r.revenue_cents),
                })
            })
            .collect())
    }

    async fn connector_revenue(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<ConnectorRevenue>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let sql = format!(
            "SELECT source,
                    count() AS conversions,
                    toInt64(sum(amount_cents)) AS revenue_cents
             FROM connector_events
             WHERE org_id = ? AND event_date BETWEEN toDate(?) AND toDate(?)
               AND lower(status) IN {COUNTED_STATUSES}
             GROUP BY source"
        );
        let rows: Vec<ConnectorRow> = self
            .fetch("connector_revenue", &sql, &[&request.org_id, &start, &end])
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ConnectorRevenue {
                source: r.source,
                conversions: r.conversions as f64,
                revenue: cents_to_currency(r.revenue_cents),
            })
            .collect())
    }

    async fn daily_connector_revenue(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<DailyConnectorRevenue>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let sql = format!(
            "SELECT toString(event_date) AS date,
                    source,
                    count() AS conversions,
                    toInt64(sum(amount_cents)) AS revenue_cents
             FROM connector_events
             WHERE org_id = ? AND event_date BETWEEN toDate(?) AND toDate(?)
               AND lower(status) IN {COUNTED_STATUSES}
             GROUP BY event_date, source
             ORDER BY event_date"
        );
        let rows: Vec<DailyConnectorRow> = self
            .fetch(
                "daily_connector_revenue",
                &sql,
                &[&request.org_id, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(DailyConnectorRevenue {
                    date: parse_date("daily_connector_revenue", &r.date)?,
                    source: r.source,
                    conversions: r.conversions as f64,
                    revenue: cents_to_currency(r.revenue_cents),
                })
            })
            .collect())
    }

    async fn click_level_attribution(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<ClickLevelAttribution>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<ClickAttributionRow> = self
            .fetch(
                "click_level_attribution",
                "SELECT platform,
                        click_id_type,
                        model,
                        toInt64(sum(revenue_cents)) AS revenue_cents,
                        toFloat64(sum(conversion_credit)) AS conversions,
                        toFloat64(avg(credit_percent)) AS credit_percent
                 FROM click_attributions
                 WHERE org_id = ? AND conversion_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY platform, click_id_type, model",
                &[&request.org_id, &start, &end],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ClickLevelAttribution {
                platform: r.platform,
                click_id_type: r.click_id_type,
                model: r.model,
                revenue: cents_to_currency(r.revenue_cents),
                conversions: r.conversions,
                credit_percent: r.credit_percent,
            })
            .collect())
    }

    async fn click_id_stats(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<ClickIdStats> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<ClickIdTypeRow> = self
            .fetch(
                "click_id_stats",
                "SELECT click_id_type, count() AS click_ids
                 FROM conversion_click_ids
                 WHERE org_id = ? AND conversion_date BETWEEN toDate(?) AND toDate(?)
                 GROUP BY click_id_type",
                &[&request.org_id, &start, &end],
            )
            .await?;

        let by_type: BTreeMap<String, u64> = rows
            .into_iter()
            .map(|r| (r.click_id_type, r.click_ids))
            .collect();
        let click_id_count = by_type.values().sum();

        Ok(ClickIdStats {
            has_click_ids: click_id_count > 0,
            click_id_count,
            by_type,
        })
    }

    async fn funnel_position_data(
        &self,
        request: &AttributionRequest,
    ) -> AttributionResult<Vec<FunnelPositionData>> {
        let start = request.start_date.to_string();
        let end = request.end_date.to_string();
        let rows: Vec<FunnelRow> = self
            .fetch(
                "funnel_position_data",
                "SELECT goal_id,
                        funnel_position,
                        conversion_rate,
                        visitor_count,
                        by_channel,
                        flow_tag,
                        is_exclusive
                 FROM goal_funnel_positions
                 WHERE org_id = ? AND org_tag = ?
                   AND snapshot_date BETWEEN toDate(?) AND toDate(?)
                 ORDER BY goal_id, funnel_position",
                &[&request.org_id, &request.org_tag, &start, &end],
            )
            .await?;

        Ok(parse_funnel_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funnel_row(by_channel: &str) -> FunnelRow {
        FunnelRow {
            goal_id: "goal_signup".into(),
            funnel_position: 2,
            conversion_rate: 0.4,
            visitor_count: 120,
            by_channel: by_channel.into(),
            flow_tag: Some("".into()),
            is_exclusive: 1,
        }
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(cents_to_currency(87_000), 870.0);
        assert_eq!(cents_to_currency(0), 0.0);
    }

    #[test]
    fn test_funnel_row_parses_channel_map() {
        let data = funnel_row(r#"{"google": 80, "fb": 40}"#).parse().unwrap();
        assert_eq!(data.by_channel.get("google"), Some(&80));
        assert!(data.is_exclusive);
        assert_eq!(data.flow_tag, None);
    }

    #[test]
    fn test_malformed_funnel_rows_are_skipped() {
        let rows = vec![
            funnel_row(r#"{"google": 10}"#),
            funnel_row("{not json"),
            funnel_row(""),
        ];
        let parsed = parse_funnel_rows(rows);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[1].by_channel.is_empty());
    }
}
