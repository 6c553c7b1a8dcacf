use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

use crate::data::types::{Event, EventInfo, LATEST_EVENT_ID};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Source returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Failed to parse source payload: {0}")]
    Parse(String),
}

/// Authoritative event data. `"latest"` is resolved by the source itself.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_event(&self, id: &str) -> Result<Event, SourceError>;

    async fn fetch_schedule(&self) -> Result<Vec<EventInfo>, SourceError>;
}

/// Client for a JSON events API exposing `/events/{id}` and `/schedule`.
pub struct HttpEventSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    events: Vec<EventInfo>,
}

impl HttpEventSource {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn event_url(&self, id: &str) -> String {
        format!("{}/events/{}", self.base_url, id)
    }

    fn schedule_url(&self) -> String {
        format!("{}/schedule", self.base_url)
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn fetch_event(&self, id: &str) -> Result<Event, SourceError> {
        let url = self.event_url(id);
        info!("Fetching event {} from {}", id, url);

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(id.to_string())),
            status if !status.is_success() => return Err(SourceError::Status { status, url }),
            _ => {}
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn fetch_schedule(&self) -> Result<Vec<EventInfo>, SourceError> {
        let url = self.schedule_url();
        info!("Fetching schedule from {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { status, url });
        }

        let body = response.text().await?;
        let parsed: ScheduleResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(parsed.events)
    }
}

/// In-memory source, loadable from a JSON file. Serves local runs and tests.
pub struct FixtureEventSource {
    events: DashMap<String, Event>,
    latest: Option<String>,
    schedule: Vec<EventInfo>,
    fetches: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    latest: Option<String>,
    events: Vec<Event>,
    #[serde(default)]
    schedule: Vec<EventInfo>,
}

impl FixtureEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into_iter().map(|e| (e.id.clone(), e)).collect(),
            latest: None,
            schedule: Vec::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_latest(mut self, id: &str) -> Self {
        self.latest = Some(id.to_string());
        self
    }

    pub fn with_schedule(mut self, schedule: Vec<EventInfo>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path))?;

        let fixture: FixtureFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fixture file: {}", path))?;

        let mut source = Self::new(fixture.events).with_schedule(fixture.schedule);
        source.latest = fixture.latest;
        Ok(source)
    }

    /// Replace (or add) an event, as the upstream would after results come in.
    pub fn upsert(&self, event: Event) {
        self.events.insert(event.id.clone(), event);
    }

    /// Number of `fetch_event` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FixtureEventSource {
    async fn fetch_event(&self, id: &str) -> Result<Event, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let key = match (id, &self.latest) {
            (LATEST_EVENT_ID, Some(latest)) => latest.as_str(),
            _ => id,
        };

        self.events
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn fetch_schedule(&self) -> Result<Vec<EventInfo>, SourceError> {
        Ok(self.schedule.clone())
    }
}
