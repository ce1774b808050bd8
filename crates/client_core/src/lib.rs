use std::sync::Arc;

use anyhow::Result;
use shared::domain::PlaceId;
use storage::{PreferenceStore, VisitedPlaces};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod catalog;
pub mod config;
pub mod places_api;

pub use catalog::{CatalogSnapshot, CatalogState, FetchOutcome, FetchTicket, ListFetch};
pub use places_api::{GooglePlacesClient, PlacesApi, SearchPage};

#[derive(Debug, Clone)]
pub enum CatalogEvent {
    StateChanged(CatalogSnapshot),
    Error(String),
}

/// Drives [`CatalogState`] against the remote catalog and the visited store.
///
/// The state lock is never held across a network call, so fetches may
/// overlap; fetch tickets decide which completions are applied. Visited-set
/// reads and writes happen under the lock so toggles stay ordered.
pub struct PlaceCatalog {
    api: Arc<dyn PlacesApi>,
    visited: VisitedPlaces,
    state: Mutex<CatalogState>,
    events: broadcast::Sender<CatalogEvent>,
}

impl PlaceCatalog {
    pub fn new(api: Arc<dyn PlacesApi>, store: Arc<dyn PreferenceStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            visited: VisitedPlaces::new(store),
            state: Mutex::new(CatalogState::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.state.lock().await.snapshot()
    }

    fn publish(&self, snapshot: CatalogSnapshot) {
        let _ = self.events.send(CatalogEvent::StateChanged(snapshot));
    }

    fn publish_outcome(&self, outcome: FetchOutcome, snapshot: CatalogSnapshot) {
        if outcome == FetchOutcome::Failed {
            if let Some(message) = snapshot.error.clone() {
                let _ = self.events.send(CatalogEvent::Error(message));
            }
        }
        self.publish(snapshot);
    }

    /// Fetches the page at the current cursor. Skipped while any fetch is outstanding.
    pub async fn start_list_fetch(&self) -> FetchOutcome {
        let (request, snapshot) = {
            let mut state = self.state.lock().await;
            let request = state.begin_list_fetch();
            (request, state.snapshot())
        };
        let Some(request) = request else {
            debug!("catalog: list fetch skipped; a fetch is already outstanding");
            return FetchOutcome::Skipped;
        };
        self.publish(snapshot);
        self.run_list_fetch(request).await
    }

    async fn run_list_fetch(&self, request: ListFetch) -> FetchOutcome {
        let result = self.api.search_page(request.cursor.clone()).await;

        let (outcome, snapshot) = {
            let mut state = self.state.lock().await;
            let visited = self.visited.get_visited_ids().await;
            let outcome = state.finish_list_fetch(request.ticket, result, &visited);
            (outcome, state.snapshot())
        };

        match outcome {
            FetchOutcome::Applied => info!(
                cursor = ?request.cursor,
                places = snapshot.places.len(),
                has_more = snapshot.page_cursor.is_some(),
                "catalog: page applied"
            ),
            FetchOutcome::Failed => warn!(
                error = snapshot.error.as_deref().unwrap_or_default(),
                "catalog: list fetch failed"
            ),
            _ => debug!(
                generation = request.ticket.generation(),
                "catalog: stale list result dropped"
            ),
        }
        self.publish_outcome(outcome, snapshot);
        outcome
    }

    pub async fn start_detail_fetch(&self, id: &PlaceId) -> FetchOutcome {
        let (ticket, snapshot) = {
            let mut state = self.state.lock().await;
            let ticket = state.begin_detail_fetch();
            (ticket, state.snapshot())
        };
        self.publish(snapshot);

        let result = self.api.fetch_detail(id).await;

        let (outcome, snapshot) = {
            let mut state = self.state.lock().await;
            let visited = self.visited.get_visited_ids().await;
            let outcome = state.finish_detail_fetch(ticket, result, &visited);
            (outcome, state.snapshot())
        };

        match outcome {
            FetchOutcome::Applied => info!(place_id = %id, "catalog: place detail applied"),
            FetchOutcome::Failed => warn!(
                place_id = %id,
                error = snapshot.error.as_deref().unwrap_or_default(),
                "catalog: detail fetch failed"
            ),
            _ => debug!(
                place_id = %id,
                generation = ticket.generation(),
                "catalog: stale detail result dropped"
            ),
        }
        self.publish_outcome(outcome, snapshot);
        outcome
    }

    /// Flips `visited` and writes the new membership through to the store.
    /// Returns the new flag, or `None` if no loaded record has this id.
    ///
    /// A failed write undoes the flip, publishes the unchanged state with a
    /// [`CatalogEvent::Error`], and returns the error.
    pub async fn toggle_visited(&self, id: &PlaceId) -> Result<Option<bool>> {
        let (visited, snapshot) = {
            let mut state = self.state.lock().await;
            let Some(visited) = state.toggle_visited(id) else {
                debug!(place_id = %id, "catalog: toggle ignored for unknown place");
                return Ok(None);
            };
            if let Err(err) = self.visited.mark(id, visited).await {
                state.toggle_visited(id);
                let snapshot = state.snapshot();
                drop(state);

                warn!(place_id = %id, error = %err, "catalog: visited write failed");
                let _ = self.events.send(CatalogEvent::Error(format!(
                    "failed to save visited place {id}: {err:#}"
                )));
                self.publish(snapshot);
                return Err(err);
            }
            (visited, state.snapshot())
        };

        info!(place_id = %id, visited, "catalog: visited toggled");
        self.publish(snapshot);
        Ok(Some(visited))
    }

    pub async fn reset_list(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.reset_list();
            state.snapshot()
        };
        self.publish(snapshot);
    }

    pub async fn sync_visited_state(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let visited = self.visited.get_visited_ids().await;
            state.sync_visited(&visited);
            state.snapshot()
        };
        self.publish(snapshot);
    }

    /// Infinite-scroll trigger: fetches the next page only when one exists.
    pub async fn load_more(&self) -> FetchOutcome {
        {
            let state = self.state.lock().await;
            if state.loading() || !state.has_more() {
                return FetchOutcome::Skipped;
            }
        }
        self.start_list_fetch().await
    }

    /// User-initiated recovery: fresh list from the first page. Always
    /// fetches; an outstanding list fetch is superseded.
    pub async fn retry(&self) -> FetchOutcome {
        let (request, snapshot) = {
            let mut state = self.state.lock().await;
            let request = state.restart_list_fetch();
            (request, state.snapshot())
        };
        self.publish(snapshot);
        let outcome = self.run_list_fetch(request).await;
        self.sync_visited_state().await;
        outcome
    }

    pub async fn open_place(&self, id: &PlaceId) -> FetchOutcome {
        let outcome = self.start_detail_fetch(id).await;
        self.sync_visited_state().await;
        outcome
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
