use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Reserved event id that always points at the current or next event card.
pub const LATEST_EVENT_ID: &str = "latest";

const LIVE: &str = "LIVE";

/// When an event starts.
///
/// Serialized as the source reports it: an RFC 3339 timestamp, or `"LIVE"`
/// while a broadcast is running and the source has no parseable time.
/// A scheduled time keeps the source's text so a cached copy reads back
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StartTime {
    Scheduled { at: DateTime<Utc>, raw: String },
    Live,
    /// Anything the source sent that is neither `"LIVE"` nor RFC 3339.
    Unknown(String),
}

impl From<String> for StartTime {
    fn from(raw: String) -> Self {
        if raw == LIVE {
            return StartTime::Live;
        }
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => StartTime::Scheduled {
                at: dt.with_timezone(&Utc),
                raw,
            },
            Err(_) => StartTime::Unknown(raw),
        }
    }
}

impl StartTime {
    pub fn at(at: DateTime<Utc>) -> Self {
        StartTime::Scheduled {
            at,
            raw: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl From<StartTime> for String {
    fn from(start: StartTime) -> Self {
        match start {
            StartTime::Scheduled { raw, .. } => raw,
            StartTime::Live => LIVE.to_string(),
            StartTime::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    pub fighters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

impl Fight {
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            fighters: vec![a.to_string(), b.to_string()],
            winner: None,
        }
    }

    pub fn won_by(mut self, winner: &str) -> Self {
        self.winner = Some(winner.to_string());
        self
    }

    /// Winner name, with an empty string treated as unresolved.
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref().filter(|w| !w.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub start_time: StartTime,
    #[serde(default)]
    pub fights: Vec<Fight>,
}

impl Event {
    pub fn has_started(&self) -> bool {
        self.has_started_at(Utc::now())
    }

    pub fn has_started_at(&self, now: DateTime<Utc>) -> bool {
        match &self.start_time {
            StartTime::Live => true,
            StartTime::Scheduled { at, .. } => *at <= now,
            // unparsable times read as long past
            StartTime::Unknown(_) => true,
        }
    }

    /// True once every fight has a winner. Vacuously true for an empty card.
    pub fn is_finished(&self) -> bool {
        self.fights.iter().all(|fight| fight.winner().is_some())
    }
}

/// One row of the upcoming events schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: String,
    pub name: String,
    pub date: DateTime<Utc>,
}
