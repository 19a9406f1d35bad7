use serde::Deserialize;
use tracing::debug;

use crate::error::{AttributionError, AttributionResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `ATTRIBUTION__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub attribution: AttributionSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
}

/// Tunables for the signal hierarchy and distribution tiers.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionSettings {
    /// Half-life of the time-decay weighting, in days.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    /// How many days before a conversion day still receive decayed credit.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Multiplier for channels that belong to an exclusive funnel flow.
    #[serde(default = "default_exclusive_flow_boost")]
    pub exclusive_flow_boost: f64,
    /// Unexplained conversions above this emit a `direct` channel.
    #[serde(default = "default_direct_conversion_threshold")]
    pub direct_conversion_threshold: f64,
    /// Unexplained revenue above this emit a `direct` channel.
    #[serde(default = "default_direct_revenue_threshold")]
    pub direct_revenue_threshold: f64,
    /// Platform conversions above `ratio x ground truth` are flagged as over-reported.
    #[serde(default = "default_platform_overreport_ratio")]
    pub platform_overreport_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Local,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
}

// Default functions
fn default_half_life_days() -> f64 {
    2.0
}
fn default_lookback_days() -> u32 {
    7
}
fn default_exclusive_flow_boost() -> f64 {
    1.5
}
fn default_direct_conversion_threshold() -> f64 {
    0.5
}
fn default_direct_revenue_threshold() -> f64 {
    1.0
}
fn default_platform_overreport_ratio() -> f64 {
    1.2
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_backend() -> CacheBackend {
    CacheBackend::Local
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    10_000
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "attribution".to_string()
}

impl Default for AttributionSettings {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            lookback_days: default_lookback_days(),
            exclusive_flow_boost: default_exclusive_flow_boost(),
            direct_conversion_threshold: default_direct_conversion_threshold(),
            direct_revenue_threshold: default_direct_revenue_threshold(),
            platform_overreport_ratio: default_platform_overreport_ratio(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            backend: default_cache_backend(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            attribution: AttributionSettings::default(),
            cache: CacheConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(path: Option<&str>) -> AttributionResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = path, "Reading configuration file");
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("ATTRIBUTION")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("redis.urls"),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| AttributionError::Config(e.to_string()))
    }
}
