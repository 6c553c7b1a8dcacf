use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::data::cache::EventStore;
use crate::data::source::{EventSource, SourceError};
use crate::data::types::{Event, EventInfo, LATEST_EVENT_ID};
use crate::events::freshness::FreshnessPolicy;

/// Cache-aside access to events.
///
/// Reads never re-check freshness: an entry is served for as long as the store
/// keeps it, and the lifetime is decided once, when the entry is written.
/// There is no per-id locking, so concurrent misses on the same id may each
/// hit the source; the last write wins.
#[derive(Clone)]
pub struct EventFetcher {
    source: Arc<dyn EventSource>,
    store: Arc<dyn EventStore>,
    policy: FreshnessPolicy,
    schedule_ttl: Duration,
}

impl EventFetcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn EventStore>,
        policy: FreshnessPolicy,
        schedule_ttl: Duration,
    ) -> Self {
        Self {
            source,
            store,
            policy,
            schedule_ttl,
        }
    }

    pub async fn resolve(&self, id: &str) -> Result<Event, SourceError> {
        info!("Getting event, ID: {}", id);

        match self.store.get_event(id).await {
            Ok(Some(cached)) => {
                info!("Cache hit for event {}", id);
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to get event {} from cache: {}", id, e),
        }

        info!("Cache miss for event {}, fetching from source", id);
        let event = self.source.fetch_event(id).await?;

        self.store_fetched(id, &event, Utc::now()).await;
        Ok(event)
    }

    async fn store_fetched(&self, id: &str, event: &Event, now: DateTime<Utc>) {
        let ttl = self.policy.store_ttl(event, now);

        if id != LATEST_EVENT_ID {
            self.write(id, event, ttl).await;
            self.refresh_alias(event, now).await;
            return;
        }

        if !event.id.is_empty() {
            self.write(&event.id, event, ttl).await;
        }
        self.write(LATEST_EVENT_ID, event, self.policy.alias_ttl(event, now)).await;
    }

    /// Keep the alias entry in step with a direct fetch of the same event.
    async fn refresh_alias(&self, event: &Event, now: DateTime<Utc>) {
        match self.store.get_event(LATEST_EVENT_ID).await {
            Ok(Some(alias)) if alias.id == event.id => {
                self.write(LATEST_EVENT_ID, event, self.policy.alias_ttl(event, now)).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read latest alias from cache: {}", e),
        }
    }

    async fn write(&self, key: &str, event: &Event, ttl: Option<Duration>) {
        let Some(ttl) = ttl else {
            info!("Event {} is overdue without results, not caching under {}", event.id, key);
            return;
        };

        if let Err(e) = self.store.set_event(key, event, ttl).await {
            warn!("Failed to cache event {} under {}: {}", event.id, key, e);
        }
    }

    /// Upcoming events, oldest first, cached for a fixed lifetime.
    pub async fn resolve_schedule(&self) -> Result<Vec<EventInfo>, SourceError> {
        match self.store.get_schedule().await {
            Ok(Some(cached)) => {
                info!("Cache hit for schedule");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to get schedule from cache: {}", e),
        }

        info!("Cache miss, fetching schedule...");
        let mut schedule = self.source.fetch_schedule().await?;
        schedule.sort_by_key(|info| info.date);

        if let Err(e) = self.store.set_schedule(&schedule, self.schedule_ttl).await {
            warn!("Failed to cache schedule: {}", e);
        }

        Ok(schedule)
    }
}
