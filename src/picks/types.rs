use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One user's predicted winners for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picks {
    pub user_id: String,
    pub event_id: String,
    pub winners: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Picks {
    /// Placeholder for a user who has not picked yet.
    pub fn empty(user_id: &str, event_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            winners: Vec::new(),
            score: None,
            created_at: Utc::now(),
        }
    }
}

/// Query over stored picks. Empty `event_ids` matches every event.
#[derive(Debug, Clone, Default)]
pub struct PicksFilter {
    pub event_ids: Vec<String>,
    pub has_score: Option<bool>,
}

impl PicksFilter {
    pub fn unscored_for(event_id: &str) -> Self {
        Self {
            event_ids: vec![event_id.to_string()],
            has_score: Some(false),
        }
    }
}

/// Drop repeated names, keeping the first occurrence of each.
pub fn dedup_winners(winners: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    winners.into_iter().filter(|w| seen.insert(w.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let winners = vec!["C", "A", "C", "B", "A"].into_iter().map(String::from).collect();
        assert_eq!(dedup_winners(winners), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_score_omitted_until_set() {
        let mut picks = Picks::empty("user", "600");
        let json = serde_json::to_value(&picks).unwrap();
        assert!(json.get("score").is_none());
        assert_eq!(json["winners"], serde_json::json!([]));

        picks.score = Some(2);
        let json = serde_json::to_value(&picks).unwrap();
        assert_eq!(json["score"], 2);
    }
}
