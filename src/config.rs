use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_live_ttl")]
    pub live_ttl_secs: u64,
    #[serde(default = "default_lead_ttl")]
    pub lead_ttl_secs: u64,
    #[serde(default = "default_latest_finished_ttl")]
    pub latest_finished_ttl_secs: u64,
    #[serde(default = "default_schedule_ttl")]
    pub schedule_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
}

fn default_request_timeout() -> u64 { 15 }
fn default_live_ttl() -> u64 { 5 * 60 }
fn default_lead_ttl() -> u64 { 60 * 60 }
fn default_latest_finished_ttl() -> u64 { 60 * 60 }
fn default_schedule_ttl() -> u64 { 60 * 60 }
fn default_max_concurrency() -> usize { 5 }
fn default_sweep_interval() -> u64 { 15 * 60 }
fn default_csv_log_path() -> String { "scores.csv".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self { request_timeout_secs: default_request_timeout() }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            live_ttl_secs: default_live_ttl(),
            lead_ttl_secs: default_lead_ttl(),
            latest_finished_ttl_secs: default_latest_finished_ttl(),
            schedule_ttl_secs: default_schedule_ttl(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { max_concurrency: default_max_concurrency() }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { sweep_interval_secs: default_sweep_interval() }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_log_path(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub events_source_url: String,
    pub events_fixture_path: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;

        if config.aggregator.max_concurrency == 0 {
            anyhow::bail!("aggregator.max_concurrency must be at least 1");
        }

        Ok(config)
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            events_source_url: std::env::var("EVENTS_SOURCE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            events_fixture_path: std::env::var("EVENTS_FIXTURE_PATH").ok(),
        })
    }
}
