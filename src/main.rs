use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use fight_picks::config::{Config, EnvConfig};
use fight_picks::data::cache::EventCache;
use fight_picks::data::source::{EventSource, FixtureEventSource, HttpEventSource};
use fight_picks::events::aggregator::EventAggregator;
use fight_picks::events::fetcher::EventFetcher;
use fight_picks::events::freshness::FreshnessPolicy;
use fight_picks::monitoring::logger::CsvLogger;
use fight_picks::picks::persistence::PicksDatabase;
use fight_picks::picks::service::PicksService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("🥊 Fight picks starting...");

    // Load configuration
    tracing::info!("Loading configuration...");
    let config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;

    // Initialize database
    tracing::info!("Initializing database: {}", config.system.database_path);
    let db = Arc::new(PicksDatabase::new(&config.system.database_path)?);
    tracing::info!("Stored picks: {}", db.count_picks()?);

    let source: Arc<dyn EventSource> = match &env_config.events_fixture_path {
        Some(path) => {
            tracing::info!("Serving events from fixture: {}", path);
            Arc::new(FixtureEventSource::load(path)?)
        }
        None => {
            tracing::info!("Serving events from: {}", env_config.events_source_url);
            Arc::new(HttpEventSource::new(
                env_config.events_source_url.clone(),
                Duration::from_secs(config.source.request_timeout_secs),
            )?)
        }
    };

    let cache = Arc::new(EventCache::new());
    let fetcher = EventFetcher::new(
        source,
        cache.clone(),
        FreshnessPolicy::from(&config.cache),
        Duration::from_secs(config.cache.schedule_ttl_secs),
    );

    match fetcher.resolve_schedule().await {
        Ok(schedule) => tracing::info!("Upcoming events: {}", schedule.len()),
        Err(e) => tracing::warn!("Could not load schedule: {}", e),
    }

    let aggregator = EventAggregator::new(fetcher, config.aggregator.max_concurrency);
    let mut service = PicksService::new(aggregator, db);

    if config.monitoring.csv_logging {
        tracing::info!("Score ledger: {}", config.monitoring.csv_log_path);
        service = service.with_ledger(CsvLogger::new(config.monitoring.csv_log_path.clone())?);
    }

    tracing::info!("✅ Initialized, sweeping every {}s", config.scoring.sweep_interval_secs);

    let mut interval = tokio::time::interval(Duration::from_secs(config.scoring.sweep_interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired cache entries", purged);
                }

                match service.score_latest().await {
                    Ok(Some(summary)) => tracing::info!(
                        "Sweep on {}: {} scored, {} failed",
                        summary.event_id, summary.scored, summary.failed
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!("Scoring sweep failed: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}
