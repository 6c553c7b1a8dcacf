use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::data::types::Event;
use crate::picks::persistence::PicksStore;
use crate::picks::types::Picks;

/// Number of fights whose winner appears among `picks`.
///
/// Names that are unknown or belong to an unresolved fight count for nothing,
/// and repeating a name does not count it twice.
pub fn score_picks(event: &Event, picks: &[String]) -> i64 {
    let picked: HashSet<&str> = picks.iter().map(String::as_str).collect();

    event
        .fights
        .iter()
        .filter_map(|fight| fight.winner())
        .filter(|winner| picked.contains(winner))
        .count() as i64
}

/// Whether the event can be scored at all.
fn event_is_scorable(event: &Event) -> bool {
    !event.fights.is_empty() && event.is_finished()
}

/// Whether a picks row should be scored now against `event`.
fn is_scorable(event: &Event, picks: &Picks) -> bool {
    picks.score.is_none() && event_is_scorable(event) && !picks.winners.is_empty()
}

/// Compute and persist the score for `picks` the first time it is read after
/// the event finishes. Returns `true` when a score was written.
///
/// The score is set on `picks` before it is persisted; on a persistence
/// failure the error is returned and the caller must not treat the value as
/// saved.
pub async fn reconcile(store: &dyn PicksStore, event: &Event, picks: &mut Picks) -> Result<bool> {
    if !is_scorable(event, picks) {
        return Ok(false);
    }

    let score = score_picks(event, &picks.winners);
    picks.score = Some(score);
    store.set_score(&picks.user_id, &event.id, score).await?;

    info!("Scored picks for user {} on event {}: {}", picks.user_id, event.id, score);
    Ok(true)
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Rows whose fresh score was persisted
    pub saved: Vec<Picks>,
    pub failed: Vec<(Picks, anyhow::Error)>,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.saved.len() + self.failed.len()
    }
}

/// Score every unscored row in `picks` against the finished `event` and
/// persist them in one batch. Rows fail independently.
///
/// Unlike `reconcile`, a row with no winners is scored too (as 0) so the
/// sweep does not find it again on every pass.
pub async fn reconcile_batch(store: &dyn PicksStore, event: &Event, picks: Vec<Picks>) -> BatchOutcome {
    if !event_is_scorable(event) {
        return BatchOutcome::default();
    }

    let attempted: Vec<Picks> = picks
        .into_iter()
        .filter(|p| p.event_id == event.id && p.score.is_none())
        .map(|mut p| {
            p.score = Some(score_picks(event, &p.winners));
            p
        })
        .collect();

    if attempted.is_empty() {
        return BatchOutcome::default();
    }

    let results = store.batch_set_score(&attempted).await;

    let mut outcome = BatchOutcome::default();
    for (picks, result) in attempted.into_iter().zip(results) {
        match result {
            Ok(()) => outcome.saved.push(picks),
            Err(e) => {
                warn!("Failed to save score for user {} on event {}: {:#}", picks.user_id, event.id, e);
                outcome.failed.push((picks, e));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{Fight, StartTime};
    use crate::picks::persistence::PicksDatabase;
    use crate::picks::types::PicksFilter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn finished_card() -> Event {
        Event {
            id: "E".to_string(),
            start_time: StartTime::Live,
            fights: vec![
                Fight::new("A", "B").won_by("A"),
                Fight::new("C", "D").won_by("D"),
                Fight::new("E", "F").won_by("E"),
            ],
        }
    }

    fn picks_for(user: &str, winners: &[&str]) -> Picks {
        let mut picks = Picks::empty(user, "E");
        picks.winners = names(winners);
        picks
    }

    /// Store that only counts `set_score` calls, optionally failing them.
    #[derive(Default)]
    struct CountingStore {
        set_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PicksStore for CountingStore {
        async fn get_picks(&self, _user_id: &str, _event_id: &str) -> Result<Option<Picks>> {
            Ok(None)
        }

        async fn get_all_user_picks(&self, _user_id: &str) -> Result<Vec<Picks>> {
            Ok(Vec::new())
        }

        async fn get_picks_by_filter(&self, _filter: &PicksFilter) -> Result<Vec<Picks>> {
            Ok(Vec::new())
        }

        async fn save_winners(&self, _user_id: &str, _event_id: &str, _winners: &[String]) -> Result<()> {
            Ok(())
        }

        async fn set_score(&self, _user_id: &str, _event_id: &str, _score: i64) -> Result<()> {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("database is locked");
            }
            Ok(())
        }

        async fn batch_set_score(&self, picks: &[Picks]) -> Vec<Result<()>> {
            self.set_calls.fetch_add(picks.len(), Ordering::SeqCst);
            picks.iter().map(|_| Ok(())).collect()
        }
    }

    #[test]
    fn test_end_to_end_scores() {
        let event = finished_card();
        assert_eq!(score_picks(&event, &names(&["A", "D", "F"])), 2);
        assert_eq!(score_picks(&event, &names(&["A", "D", "E"])), 3);
    }

    #[test]
    fn test_score_order_and_duplicates() {
        let event = finished_card();
        assert_eq!(score_picks(&event, &names(&["E", "A"])), 2);
        assert_eq!(score_picks(&event, &names(&["A", "E"])), 2);
        assert_eq!(score_picks(&event, &names(&["A", "A", "A"])), 1);
    }

    #[test]
    fn test_unknown_and_unresolved_score_zero() {
        let mut event = finished_card();
        event.fights[0].winner = None;

        assert_eq!(score_picks(&event, &names(&["A"])), 0);
        assert_eq!(score_picks(&event, &names(&["Z"])), 0);
        assert_eq!(score_picks(&event, &[]), 0);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = CountingStore::default();
        let event = finished_card();
        let mut picks = picks_for("user", &["A", "D", "F"]);

        assert!(reconcile(&store, &event, &mut picks).await.unwrap());
        assert_eq!(picks.score, Some(2));

        assert!(!reconcile(&store, &event, &mut picks).await.unwrap());
        assert_eq!(store.set_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconcile_preconditions() {
        let store = CountingStore::default();

        let mut unfinished = finished_card();
        unfinished.fights[2].winner = None;
        let mut picks = picks_for("user", &["A"]);
        assert!(!reconcile(&store, &unfinished, &mut picks).await.unwrap());
        assert_eq!(picks.score, None);

        let mut empty = picks_for("user", &[]);
        assert!(!reconcile(&store, &finished_card(), &mut empty).await.unwrap());
        assert_eq!(empty.score, None);

        let mut no_fights = finished_card();
        no_fights.fights.clear();
        let mut picks = picks_for("user", &["A"]);
        assert!(!reconcile(&store, &no_fights, &mut picks).await.unwrap());

        assert_eq!(store.set_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconcile_propagates_store_failure() {
        let store = CountingStore {
            fail: true,
            ..Default::default()
        };
        let mut picks = picks_for("user", &["A"]);

        assert!(reconcile(&store, &finished_card(), &mut picks).await.is_err());
    }

    #[tokio::test]
    async fn test_reconcile_against_database() {
        let db = PicksDatabase::in_memory().unwrap();
        db.save_winners("user", "E", &names(&["A", "D", "F"])).await.unwrap();

        let mut picks = db.get_picks("user", "E").await.unwrap().unwrap();
        reconcile(&db, &finished_card(), &mut picks).await.unwrap();

        let stored = db.get_picks("user", "E").await.unwrap().unwrap();
        assert_eq!(stored.score, Some(2));
    }

    #[tokio::test]
    async fn test_batch_scores_each_row() {
        let db = PicksDatabase::in_memory().unwrap();
        db.save_winners("u1", "E", &names(&["A", "D", "E"])).await.unwrap();
        db.save_winners("u2", "E", &names(&["B"])).await.unwrap();

        let rows = db.get_picks_by_filter(&PicksFilter::unscored_for("E")).await.unwrap();
        let outcome = reconcile_batch(&db, &finished_card(), rows).await;

        assert_eq!(outcome.attempted(), 2);
        assert_eq!(outcome.saved.len(), 2);
        assert_eq!(db.get_picks("u1", "E").await.unwrap().unwrap().score, Some(3));
        assert_eq!(db.get_picks("u2", "E").await.unwrap().unwrap().score, Some(0));
    }

    #[tokio::test]
    async fn test_batch_partial_failure_does_not_abort() {
        let db = PicksDatabase::in_memory().unwrap();
        db.save_winners("u1", "E", &names(&["A"])).await.unwrap();

        // u2 was never stored, so its update fails on its own
        let rows = vec![
            db.get_picks("u1", "E").await.unwrap().unwrap(),
            picks_for("u2", &["D"]),
        ];
        let outcome = reconcile_batch(&db, &finished_card(), rows).await;

        assert_eq!(outcome.attempted(), 2);
        assert_eq!(outcome.saved.len(), 1);
        assert_eq!(outcome.saved[0].user_id, "u1");
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0.user_id, "u2");
        assert_eq!(db.get_picks("u1", "E").await.unwrap().unwrap().score, Some(1));
    }

    #[tokio::test]
    async fn test_batch_skips_scored_and_foreign_rows() {
        let store = CountingStore::default();
        let mut scored = picks_for("u1", &["A"]);
        scored.score = Some(1);
        let mut other_event = picks_for("u2", &["A"]);
        other_event.event_id = "other".to_string();

        let outcome = reconcile_batch(&store, &finished_card(), vec![scored, other_event]).await;

        assert_eq!(outcome.attempted(), 0);
        assert_eq!(store.set_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_scores_empty_picks_as_zero() {
        let db = PicksDatabase::in_memory().unwrap();
        db.save_winners("user", "E", &[]).await.unwrap();

        let rows = db.get_picks_by_filter(&PicksFilter::unscored_for("E")).await.unwrap();
        let outcome = reconcile_batch(&db, &finished_card(), rows).await;

        assert_eq!(outcome.saved.len(), 1);
        assert_eq!(db.get_picks("user", "E").await.unwrap().unwrap().score, Some(0));
    }

    #[tokio::test]
    async fn test_batch_waits_for_finished_card() {
        let store = CountingStore::default();
        let mut unfinished = finished_card();
        unfinished.fights[0].winner = None;

        let outcome = reconcile_batch(&store, &unfinished, vec![picks_for("u1", &["A"])]).await;

        assert_eq!(outcome.attempted(), 0);
        assert_eq!(store.set_calls.load(Ordering::SeqCst), 0);
    }
}
