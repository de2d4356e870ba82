use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use super::TicketValidator;
use crate::catalog::SearchResult;
use crate::errors::{Error, Result};
use crate::session::SessionContext;

/// Typeahead search: waits briefly, then searches, cancelling any search
/// still pending from an earlier keystroke.
pub struct SearchDebouncer {
    delay: Duration,
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    generation: u64,
    handle: Option<AbortHandle>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// `None` when a newer query superseded this one.
    pub async fn search(
        &self,
        validator: Arc<dyn TicketValidator>,
        session: SessionContext,
        query: String,
    ) -> Option<Result<Vec<SearchResult>>> {
        let delay = self.delay;
        // Spawning and replacing the slot share one critical section, so the
        // stored handle always belongs to the newest query.
        let (generation, handle) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                validator.search(&session, &query).await
            });
            if let Some(previous) = pending.handle.replace(handle.abort_handle()) {
                previous.abort();
            }
            pending.generation = pending.generation.wrapping_add(1);
            (pending.generation, handle)
        };

        let outcome = handle.await;

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.generation == generation {
                pending.handle = None;
            }
        }

        match outcome {
            Ok(result) => Some(result),
            Err(err) if err.is_cancelled() => None,
            Err(err) => Some(Err(Error::unexpected(format!("search task failed: {err}")))),
        }
    }
}
