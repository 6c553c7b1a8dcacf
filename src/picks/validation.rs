use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::data::types::Event;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PicksError {
    #[error("Too many picks: {picked} picks for {fights} fights")]
    TooManyPicks { picked: usize, fights: usize },

    #[error("Unknown fighter: {0}")]
    UnknownFighter(String),

    #[error("Cannot pick both fighters in the same fight: {0:?}")]
    SameFight(Vec<String>),

    #[error("Picks for event {0} are closed")]
    PicksClosed(String),
}

/// Check a candidate set of winners against the event's card.
///
/// Callers de-duplicate first; a repeated name reads as a second pick in the
/// same fight.
pub fn validate_picks(event: &Event, picks: &[String]) -> Result<(), PicksError> {
    if picks.len() > event.fights.len() {
        return Err(PicksError::TooManyPicks {
            picked: picks.len(),
            fights: event.fights.len(),
        });
    }

    let fight_of: HashMap<&str, usize> = event
        .fights
        .iter()
        .enumerate()
        .flat_map(|(index, fight)| fight.fighters.iter().map(move |name| (name.as_str(), index)))
        .collect();

    let mut picked_fights = HashSet::new();
    for pick in picks {
        let index = *fight_of
            .get(pick.as_str())
            .ok_or_else(|| PicksError::UnknownFighter(pick.clone()))?;

        if !picked_fights.insert(index) {
            return Err(PicksError::SameFight(event.fights[index].fighters.clone()));
        }
    }

    Ok(())
}

/// Picks may only change before the event starts.
pub fn ensure_open(event: &Event, now: DateTime<Utc>) -> Result<(), PicksError> {
    if event.has_started_at(now) {
        return Err(PicksError::PicksClosed(event.id.clone()));
    }
    Ok(())
}
