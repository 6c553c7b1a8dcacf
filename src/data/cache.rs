use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

use crate::data::types::{Event, EventInfo};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key/value store for fetched events. A `ttl` of zero stores without expiry.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<Option<Event>, CacheError>;

    async fn set_event(&self, id: &str, event: &Event, ttl: Duration) -> Result<(), CacheError>;

    async fn get_schedule(&self) -> Result<Option<Vec<EventInfo>>, CacheError>;

    async fn set_schedule(&self, schedule: &[EventInfo], ttl: Duration) -> Result<(), CacheError>;
}

/// In-process event store. Values are kept as JSON so entries look exactly
/// like what a remote cache would hold.
pub struct EventCache {
    cache: DashMap<String, CachedEntry>,
}

struct CachedEntry {
    json: String,
    timestamp: Instant,
    ttl: Option<Duration>,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        matches!(self.ttl, Some(ttl) if self.timestamp.elapsed() >= ttl)
    }
}

const SCHEDULE_KEY: &str = "upcoming_events";

fn event_key(id: &str) -> String {
    format!("events#{}", id)
}

impl EventCache {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    fn insert<T: Serialize + ?Sized>(&self, key: String, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let json = serde_json::to_string(value).map_err(|e| CacheError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        self.cache.insert(key, CachedEntry {
            json,
            timestamp: Instant::now(),
            ttl: (!ttl.is_zero()).then_some(ttl),
        });
        Ok(())
    }

    /// Get value if not expired (evict on read)
    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let json = match self.cache.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry); // Drop the read lock
                // a writer may have replaced the entry in between
                self.cache.remove_if(key, |_, entry| entry.is_expired());
                return Ok(None);
            }
            Some(entry) => entry.json.clone(),
            None => return Ok(None),
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Drop expired entries without waiting for a read
    pub fn purge_expired(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.cache.len())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for EventCache {
    async fn get_event(&self, id: &str) -> Result<Option<Event>, CacheError> {
        self.lookup(&event_key(id))
    }

    async fn set_event(&self, id: &str, event: &Event, ttl: Duration) -> Result<(), CacheError> {
        self.insert(event_key(id), event, ttl)
    }

    async fn get_schedule(&self) -> Result<Option<Vec<EventInfo>>, CacheError> {
        self.lookup(SCHEDULE_KEY)
    }

    async fn set_schedule(&self, schedule: &[EventInfo], ttl: Duration) -> Result<(), CacheError> {
        self.insert(SCHEDULE_KEY.to_string(), schedule, ttl)
    }
}
