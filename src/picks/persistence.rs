use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection, Row};
use std::sync::{Mutex, MutexGuard};

use crate::picks::types::{Picks, PicksFilter};

/// Durable storage for users' picks. At most one row per (user, event).
#[async_trait]
pub trait PicksStore: Send + Sync {
    async fn get_picks(&self, user_id: &str, event_id: &str) -> Result<Option<Picks>>;

    /// Newest submission first.
    async fn get_all_user_picks(&self, user_id: &str) -> Result<Vec<Picks>>;

    async fn get_picks_by_filter(&self, filter: &PicksFilter) -> Result<Vec<Picks>>;

    /// Insert or replace the winners; any previous score is cleared.
    async fn save_winners(&self, user_id: &str, event_id: &str, winners: &[String]) -> Result<()>;

    async fn set_score(&self, user_id: &str, event_id: &str, score: i64) -> Result<()>;

    /// Persist `score` for every row independently. Returns one result per
    /// row, in input order; rows without a score are reported as failures.
    async fn batch_set_score(&self, picks: &[Picks]) -> Vec<Result<()>>;
}

pub struct PicksDatabase {
    conn: Mutex<Connection>,
}

const SELECT_PICKS: &str = "SELECT user_id, event_id, winners, score, created_at FROM picks";

impl PicksDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open picks database: {}", db_path))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Create tables
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS picks (
                user_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                winners TEXT NOT NULL,
                score INTEGER,
                created_at TIMESTAMP NOT NULL,
                PRIMARY KEY (user_id, event_id)
            );

            CREATE INDEX IF NOT EXISTS idx_picks_event_id ON picks(event_id);
            CREATE INDEX IF NOT EXISTS idx_picks_created_at ON picks(created_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("picks database lock poisoned"))
    }

    /// Count stored picks rows
    pub fn count_picks(&self) -> Result<usize> {
        let count: usize = self.conn()?.query_row("SELECT COUNT(*) FROM picks", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query(&self, sql: &str, args: Vec<Value>) -> Result<Vec<Picks>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt.query_map(params_from_iter(args), read_row)?;
        let raw = rows.collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawPicks::into_picks).collect()
    }

    fn update_score(conn: &Connection, user_id: &str, event_id: &str, score: i64) -> Result<()> {
        let updated = conn.execute(
            "UPDATE picks SET score = ?1 WHERE user_id = ?2 AND event_id = ?3",
            params![score, user_id, event_id],
        )?;

        if updated == 0 {
            anyhow::bail!("No picks stored for user {} on event {}", user_id, event_id);
        }
        Ok(())
    }
}

/// Fixed-width timestamp so that text ordering matches time ordering.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

struct RawPicks {
    user_id: String,
    event_id: String,
    winners: String,
    score: Option<i64>,
    created_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawPicks> {
    Ok(RawPicks {
        user_id: row.get(0)?,
        event_id: row.get(1)?,
        winners: row.get(2)?,
        score: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl RawPicks {
    fn into_picks(self) -> Result<Picks> {
        let winners: Vec<String> = serde_json::from_str(&self.winners)
            .with_context(|| format!("Corrupt winners for user {} on event {}", self.user_id, self.event_id))?;

        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("Corrupt created_at for user {} on event {}", self.user_id, self.event_id))?
            .with_timezone(&Utc);

        Ok(Picks {
            user_id: self.user_id,
            event_id: self.event_id,
            winners,
            score: self.score,
            created_at,
        })
    }
}

#[async_trait]
impl PicksStore for PicksDatabase {
    async fn get_picks(&self, user_id: &str, event_id: &str) -> Result<Option<Picks>> {
        let sql = format!("{} WHERE user_id = ?1 AND event_id = ?2", SELECT_PICKS);
        let args = vec![Value::from(user_id.to_string()), Value::from(event_id.to_string())];
        Ok(self.query(&sql, args)?.into_iter().next())
    }

    async fn get_all_user_picks(&self, user_id: &str) -> Result<Vec<Picks>> {
        let sql = format!("{} WHERE user_id = ?1 ORDER BY created_at DESC", SELECT_PICKS);
        self.query(&sql, vec![Value::from(user_id.to_string())])
    }

    async fn get_picks_by_filter(&self, filter: &PicksFilter) -> Result<Vec<Picks>> {
        let mut conds = Vec::new();
        let mut args = Vec::new();

        if !filter.event_ids.is_empty() {
            let placeholders = vec!["?"; filter.event_ids.len()].join(", ");
            conds.push(format!("event_id IN ({})", placeholders));
            args.extend(filter.event_ids.iter().cloned().map(Value::from));
        }

        match filter.has_score {
            Some(true) => conds.push("score IS NOT NULL".to_string()),
            Some(false) => conds.push("score IS NULL".to_string()),
            None => {}
        }

        let mut sql = SELECT_PICKS.to_string();
        if !conds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conds.join(" AND "));
        }

        self.query(&sql, args)
    }

    async fn save_winners(&self, user_id: &str, event_id: &str, winners: &[String]) -> Result<()> {
        let winners_json = serde_json::to_string(winners)?;

        self.conn()?.execute(
            "INSERT INTO picks (user_id, event_id, winners, score, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)
             ON CONFLICT (user_id, event_id) DO UPDATE
             SET winners = excluded.winners, score = NULL, created_at = excluded.created_at",
            params![user_id, event_id, winners_json, now_timestamp()],
        )?;
        Ok(())
    }

    async fn set_score(&self, user_id: &str, event_id: &str, score: i64) -> Result<()> {
        let conn = self.conn()?;
        Self::update_score(&conn, user_id, event_id, score)
    }

    async fn batch_set_score(&self, picks: &[Picks]) -> Vec<Result<()>> {
        let conn = match self.conn() {
            Ok(conn) => conn,
            Err(e) => return picks.iter().map(|_| Err(anyhow!("{}", e))).collect(),
        };

        picks
            .iter()
            .map(|p| match p.score {
                Some(score) => Self::update_score(&conn, &p.user_id, &p.event_id, score),
                None => Err(anyhow!("No score computed for user {} on event {}", p.user_id, p.event_id)),
            })
            .collect()
    }
}
