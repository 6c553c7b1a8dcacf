pub mod aggregator;
pub mod fetcher;
pub mod freshness;

use crate::data::source::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Event lookup for {id} did not complete: {reason}")]
    Worker { id: String, reason: String },
}
