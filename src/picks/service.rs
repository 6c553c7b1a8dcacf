use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::types::{Event, LATEST_EVENT_ID};
use crate::events::aggregator::EventAggregator;
use crate::monitoring::logger::CsvLogger;
use crate::picks::persistence::PicksStore;
use crate::picks::scoring::{reconcile, reconcile_batch};
use crate::picks::types::{dedup_winners, Picks, PicksFilter};
use crate::picks::validation::{ensure_open, validate_picks, PicksError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The picks were refused; the reason is safe to show the user.
    #[error(transparent)]
    Rejected(#[from] PicksError),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct PicksWithEvent {
    #[serde(flatten)]
    pub picks: Picks,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub event_id: String,
    pub scored: usize,
    pub failed: usize,
}

/// Picks operations as handlers call them: events come through the cache,
/// scores are reconciled on every read.
pub struct PicksService {
    events: EventAggregator,
    store: Arc<dyn PicksStore>,
    ledger: Option<CsvLogger>,
}

impl PicksService {
    pub fn new(events: EventAggregator, store: Arc<dyn PicksStore>) -> Self {
        Self {
            events,
            store,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: CsvLogger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    async fn resolve(&self, event_id: &str) -> Result<Event> {
        self.events
            .fetcher()
            .resolve(event_id)
            .await
            .with_context(|| format!("Failed to get event {}", event_id))
    }

    /// Save a user's winners for an event that has not started yet.
    pub async fn submit(&self, user_id: &str, event_id: &str, winners: Vec<String>) -> Result<Picks, SubmitError> {
        let winners = dedup_winners(winners);
        let event = self.resolve(event_id).await?;

        ensure_open(&event, Utc::now())?;
        validate_picks(&event, &winners)?;

        self.store
            .save_winners(user_id, &event.id, &winners)
            .await
            .context("Failed to save picks")?;

        info!("Saved {} picks for user {} on event {}", winners.len(), user_id, event.id);

        let saved = self
            .store
            .get_picks(user_id, &event.id)
            .await?
            .ok_or_else(|| anyhow!("Picks for user {} on event {} vanished after save", user_id, event.id))?;
        Ok(saved)
    }

    /// A user's picks for one event, scored if the event has finished.
    pub async fn picks_for(&self, user_id: &str, event_id: &str) -> Result<Picks> {
        let event = self.resolve(event_id).await?;

        let mut picks = self
            .store
            .get_picks(user_id, &event.id)
            .await?
            .unwrap_or_else(|| Picks::empty(user_id, &event.id));

        reconcile(self.store.as_ref(), &event, &mut picks).await?;
        Ok(picks)
    }

    /// Every pick the user has made, newest first, each with its event.
    pub async fn history(&self, user_id: &str) -> Result<Vec<PicksWithEvent>> {
        let all = self
            .store
            .get_all_user_picks(user_id)
            .await
            .context("Error getting all picks")?;

        if all.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = all.iter().map(|p| p.event_id.clone()).collect();
        let events = self
            .events
            .resolve_many(&ids)
            .await
            .context("Error getting events from IDs")?;

        let mut history = Vec::with_capacity(all.len());
        for mut picks in all {
            let event = events
                .get(&picks.event_id)
                .cloned()
                .ok_or_else(|| anyhow!("Event {} missing from batch lookup", picks.event_id))?;

            reconcile(self.store.as_ref(), &event, &mut picks).await?;
            history.push(PicksWithEvent { picks, event });
        }

        Ok(history)
    }

    /// Score every unscored pick on the latest event once it has finished.
    /// Returns `None` when there is nothing to score yet.
    pub async fn score_latest(&self) -> Result<Option<SweepSummary>> {
        let latest = self.resolve(LATEST_EVENT_ID).await?;

        if latest.fights.is_empty() || !latest.is_finished() {
            info!("Latest event {} is not finished, skipping scoring", latest.id);
            return Ok(None);
        }

        let unscored = self
            .store
            .get_picks_by_filter(&PicksFilter::unscored_for(&latest.id))
            .await?;

        if unscored.is_empty() {
            info!("All picks scored for event {}, skipping", latest.id);
            return Ok(None);
        }

        info!("Scoring {} picks for event {}", unscored.len(), latest.id);
        let outcome = reconcile_batch(self.store.as_ref(), &latest, unscored).await;

        let summary = SweepSummary {
            event_id: latest.id.clone(),
            scored: outcome.saved.len(),
            failed: outcome.failed.len(),
        };

        if let Some(ledger) = &self.ledger {
            self.write_ledger(ledger, &outcome.saved, &summary);
        }

        if summary.failed > 0 {
            warn!("Failed to save {} of {} scores", summary.failed, outcome.attempted());
        }
        info!("Scored {} picks for event {}", summary.scored, summary.event_id);

        Ok(Some(summary))
    }

    fn write_ledger(&self, ledger: &CsvLogger, rows: &[Picks], summary: &SweepSummary) {
        for picks in rows {
            if let Err(e) = ledger.log_score(picks) {
                warn!("Failed to write score ledger: {}", e);
                return;
            }
        }

        let line = format!(
            "sweep {} scored={} failed={}",
            summary.event_id, summary.scored, summary.failed
        );
        if let Err(e) = ledger.log_event(&line) {
            warn!("Failed to write score ledger: {}", e);
        }
    }
}
