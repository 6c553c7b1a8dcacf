use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use crate::config::CacheConfig;
use crate::data::types::{Event, StartTime};

/// How long a fetched event may be served from cache.
///
/// A zero duration means "keep forever", matching the store's ttl contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Lifetime while the event is live
    pub live: Duration,
    /// Upper bound on lifetime before the event starts
    pub lead: Duration,
    /// Lifetime of the `"latest"` alias once its event is finished
    pub latest_finished: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            live: Duration::from_secs(5 * 60),
            lead: Duration::from_secs(60 * 60),
            latest_finished: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&CacheConfig> for FreshnessPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            live: Duration::from_secs(config.live_ttl_secs),
            lead: Duration::from_secs(config.lead_ttl_secs),
            latest_finished: Duration::from_secs(config.latest_finished_ttl_secs),
        }
    }
}

impl FreshnessPolicy {
    /// Cache lifetime for `event` as of `now`.
    ///
    /// Finished events are kept forever, live ones for `live`. Before the
    /// start the lifetime is the time left until start, capped at `lead`, so
    /// the record refreshes as the event goes live. A start time that has
    /// already passed without results, or that cannot be read, is never cached.
    pub fn ttl(&self, event: &Event, now: DateTime<Utc>) -> Duration {
        if event.is_finished() {
            return Duration::ZERO;
        }

        match &event.start_time {
            StartTime::Live => self.live,
            StartTime::Scheduled { at: start, .. } if *start > now => {
                let until_start = (*start - now).to_std().unwrap_or_default();
                until_start.min(self.lead)
            }
            StartTime::Scheduled { .. } => Duration::ZERO,
            StartTime::Unknown(raw) => {
                warn!("Unparsable start time {:?} for event {}, not caching", raw, event.id);
                Duration::ZERO
            }
        }
    }

    /// Lifetime to hand the store, or `None` when the record must not be
    /// cached at all. Only a finished event may be stored without expiry; a
    /// zero lifetime on anything else means "refetch every time".
    pub fn store_ttl(&self, event: &Event, now: DateTime<Utc>) -> Option<Duration> {
        let ttl = self.ttl(event, now);
        (event.is_finished() || !ttl.is_zero()).then_some(ttl)
    }

    /// Lifetime for the `"latest"` alias entry. A finished event must not pin
    /// the alias forever or the next card would never replace it.
    pub fn alias_ttl(&self, event: &Event, now: DateTime<Utc>) -> Option<Duration> {
        if event.is_finished() {
            Some(self.latest_finished)
        } else {
            self.store_ttl(event, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::Fight;
    use chrono::Duration as ChronoDuration;

    fn scheduled(start: DateTime<Utc>, fights: Vec<Fight>) -> Event {
        Event {
            id: "600".to_string(),
            start_time: StartTime::at(start),
            fights,
        }
    }

    fn open_card() -> Vec<Fight> {
        vec![Fight::new("A", "B").won_by("A"), Fight::new("C", "D")]
    }

    fn within_a_second(got: Duration, want: Duration) -> bool {
        (got.as_secs_f64() - want.as_secs_f64()).abs() <= 1.0
    }

    #[test]
    fn test_finished_event_kept_forever() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();
        let fights = vec![Fight::new("A", "B").won_by("A")];

        for start in [
            StartTime::Live,
            StartTime::at(now + ChronoDuration::hours(3)),
            StartTime::at(now - ChronoDuration::hours(3)),
            StartTime::Unknown("???".to_string()),
        ] {
            let event = Event {
                id: "600".to_string(),
                start_time: start,
                fights: fights.clone(),
            };
            assert_eq!(policy.ttl(&event, now), Duration::ZERO);
        }
    }

    #[test]
    fn test_live_event() {
        let policy = FreshnessPolicy::default();
        let event = Event {
            id: "600".to_string(),
            start_time: StartTime::Live,
            fights: open_card(),
        };
        assert_eq!(policy.ttl(&event, Utc::now()), Duration::from_secs(300));
    }

    #[test]
    fn test_scheduled_event() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();

        let cases = [
            (ChronoDuration::minutes(30), Duration::from_secs(30 * 60)),
            (ChronoDuration::hours(3), Duration::from_secs(60 * 60)),
            (ChronoDuration::hours(2), Duration::from_secs(60 * 60)),
            (ChronoDuration::seconds(90), Duration::from_secs(90)),
            (ChronoDuration::minutes(-20), Duration::ZERO),
            (ChronoDuration::hours(-10), Duration::ZERO),
        ];

        for (offset, want) in cases {
            let got = policy.ttl(&scheduled(now + offset, open_card()), now);
            assert!(within_a_second(got, want), "offset {}: got {:?}, want {:?}", offset, got, want);
        }
    }

    #[test]
    fn test_start_time_now_is_not_cached() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.ttl(&scheduled(now, open_card()), now), Duration::ZERO);
    }

    #[test]
    fn test_unparsable_start_time() {
        let policy = FreshnessPolicy::default();
        let event = Event {
            id: "600".to_string(),
            start_time: StartTime::Unknown("Saturday".to_string()),
            fights: open_card(),
        };
        assert_eq!(policy.ttl(&event, Utc::now()), Duration::ZERO);
    }

    #[test]
    fn test_store_ttl() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();

        let finished = scheduled(now - ChronoDuration::hours(5), vec![Fight::new("A", "B").won_by("B")]);
        assert_eq!(policy.store_ttl(&finished, now), Some(Duration::ZERO));

        let overdue = scheduled(now - ChronoDuration::minutes(5), open_card());
        assert_eq!(policy.store_ttl(&overdue, now), None);

        let upcoming = scheduled(now + ChronoDuration::hours(4), open_card());
        assert_eq!(policy.store_ttl(&upcoming, now), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_alias_ttl() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();

        let finished = scheduled(now - ChronoDuration::hours(5), vec![Fight::new("A", "B").won_by("B")]);
        assert_eq!(policy.alias_ttl(&finished, now), Some(Duration::from_secs(3600)));

        let upcoming = scheduled(now + ChronoDuration::minutes(10), open_card());
        let ttl = policy.alias_ttl(&upcoming, now).unwrap();
        assert!(within_a_second(ttl, Duration::from_secs(600)));

        let overdue = scheduled(now - ChronoDuration::minutes(5), open_card());
        assert_eq!(policy.alias_ttl(&overdue, now), None);
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            live_ttl_secs: 60,
            lead_ttl_secs: 120,
            latest_finished_ttl_secs: 30,
            schedule_ttl_secs: 10,
        };
        let policy = FreshnessPolicy::from(&config);
        assert_eq!(policy.live, Duration::from_secs(60));
        assert_eq!(policy.lead, Duration::from_secs(120));
        assert_eq!(policy.latest_finished, Duration::from_secs(30));
    }
}
