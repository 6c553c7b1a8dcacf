use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use crate::picks::types::Picks;

/// Append-only CSV ledger of scores written by the scoring sweep.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(file, "timestamp,user_id,event_id,winners,score")?;
        }

        Ok(Self { log_path })
    }

    /// Log a scored picks row to CSV
    pub fn log_score(&self, picks: &Picks) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        let score_str = match picks.score {
            Some(score) => score.to_string(),
            None => "".to_string(),
        };

        writeln!(
            file,
            "{},{},{},{},{}",
            Utc::now().to_rfc3339(),
            escape(&picks.user_id),
            escape(&picks.event_id),
            escape(&picks.winners.join("|")),
            score_str
        )?;

        Ok(())
    }

    /// Log a sweep event
    pub fn log_event(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        writeln!(file, "{},EVENT,{},,", Utc::now().to_rfc3339(), escape(event))?;

        Ok(())
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
