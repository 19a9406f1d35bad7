//! Attribution Engine: computes one smart attribution report and prints it
//! as JSON on stdout.

use attribution_analytics::{ClickHouseSource, SignalSource, SnapshotSource};
use attribution_cache::{LocalCache, RedisCache, ResultCache};
use attribution_core::config::{AppConfig, CacheBackend};
use attribution_core::types::AttributionRequest;
use attribution_reporting::SmartAttributionEngine;
use chrono::NaiveDate;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "attribution-engine")]
#[command(about = "Reconcile ad-platform, tag and revenue signals into channel attribution")]
#[command(version)]
struct Cli {
    /// Organization identifier
    #[arg(long, env = "ATTRIBUTION__ORG_ID")]
    org_id: String,

    /// Tag identifier for session tables (defaults to the org id)
    #[arg(long, env = "ATTRIBUTION__ORG_TAG")]
    org_tag: Option<String>,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Read signals from a JSON snapshot instead of ClickHouse
    #[arg(long)]
    snapshot: Option<String>,

    /// Optional TOML config file
    #[arg(long, env = "ATTRIBUTION_CONFIG")]
    config: Option<String>,

    /// Bypass the result cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// Pretty-print the report
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "attribution_engine=info,attribution_reporting=info,attribution_analytics=info"
                    .into()
            }),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let source: Arc<dyn SignalSource> = match &cli.snapshot {
        Some(path) => Arc::new(SnapshotSource::load(path).await?),
        None => {
            info!(url = %config.clickhouse.url, "Reading signals from ClickHouse");
            Arc::new(ClickHouseSource::new(&config.clickhouse))
        }
    };

    let mut engine = SmartAttributionEngine::new(source, config.attribution.clone());
    if config.cache.enabled && !cli.no_cache {
        engine = engine.with_cache(build_cache(&config).await, config.cache.ttl_secs);
    }

    let mut request = AttributionRequest::new(cli.org_id, cli.start, cli.end);
    if let Some(tag) = cli.org_tag {
        request = request.with_org_tag(tag);
    }

    let report = engine.compute(&request).await;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;

    Ok(())
}

async fn build_cache(config: &AppConfig) -> Arc<dyn ResultCache> {
    match config.cache.backend {
        CacheBackend::Local => Arc::new(LocalCache::new(config.cache.max_entries)),
        CacheBackend::Redis => match RedisCache::new(&config.redis, config.cache.max_entries).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, falling back to local cache");
                Arc::new(LocalCache::new(config.cache.max_entries))
            }
        },
    }
}
