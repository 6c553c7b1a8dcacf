use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::data::types::Event;
use crate::events::fetcher::EventFetcher;
use crate::events::EventError;

/// Resolves many event ids at once with at most `max_concurrency` lookups in
/// flight. The first failure cancels every unit that has not finished and the
/// whole call fails; there is no partial result.
#[derive(Clone)]
pub struct EventAggregator {
    fetcher: EventFetcher,
    max_concurrency: usize,
}

impl EventAggregator {
    pub fn new(fetcher: EventFetcher, max_concurrency: usize) -> Self {
        Self {
            fetcher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn fetcher(&self) -> &EventFetcher {
        &self.fetcher
    }

    pub async fn resolve_many(&self, ids: &[String]) -> Result<HashMap<String, Event>, EventError> {
        let unique: HashSet<&String> = ids.iter().collect();
        info!("Resolving {} events ({} concurrent)", unique.len(), self.max_concurrency);

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let results: Arc<DashMap<String, Event>> = Arc::new(DashMap::new());
        let mut units = JoinSet::new();

        for id in unique {
            let id = id.clone();
            let permits = permits.clone();
            let results = results.clone();
            let fetcher = self.fetcher.clone();

            units.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| EventError::Worker {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;

                let event = fetcher.resolve(&id).await?;
                results.insert(id, event);
                Ok::<(), EventError>(())
            });
        }

        while let Some(joined) = units.join_next().await {
            let outcome = joined.map_err(|e| EventError::Worker {
                id: "<unknown>".to_string(),
                reason: e.to_string(),
            });

            if let Err(e) = outcome.and_then(|unit| unit) {
                warn!("Event lookup failed, cancelling remaining lookups: {}", e);
                permits.close();
                units.abort_all();
                while units.join_next().await.is_some() {}
                return Err(e);
            }
        }

        let resolved = Arc::try_unwrap(results)
            .map(|map| map.into_iter().collect())
            .unwrap_or_else(|shared| {
                shared.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
            });

        Ok(resolved)
    }
}
