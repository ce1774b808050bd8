//! Catalog state: fetched places, the detail place, pagination and fetch status.
//!
//! Records live in one map keyed by id. The list and the detail view only hold
//! ids, so both always observe the same `visited` flag.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{PlaceId, PlaceRecord, VisitedSet},
    error::FetchError,
};
use tracing::debug;

use crate::places_api::SearchPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchKind {
    List,
    Detail,
}

/// Issued when a fetch starts; required to apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    kind: FetchKind,
    generation: u64,
    list_epoch: u64,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFetch {
    pub ticket: FetchTicket,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Applied,
    Failed,
    /// The result belonged to a superseded fetch and was dropped.
    Stale,
    /// No fetch was started.
    Skipped,
}

#[derive(Debug, Default)]
struct FetchSlot {
    generation: u64,
    inflight: Option<u64>,
}

impl FetchSlot {
    fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.inflight = Some(self.generation);
        self.generation
    }

    fn complete(&mut self, generation: u64) -> bool {
        if self.inflight == Some(generation) {
            self.inflight = None;
            true
        } else {
            false
        }
    }

    fn is_active(&self) -> bool {
        self.inflight.is_some()
    }
}

/// Flat copy of the catalog handed to views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub places: Vec<PlaceRecord>,
    pub loading: bool,
    pub error: Option<String>,
    pub page_cursor: Option<String>,
    pub current_place: Option<PlaceRecord>,
}

#[derive(Debug, Default)]
pub struct CatalogState {
    records: HashMap<PlaceId, PlaceRecord>,
    list: Vec<PlaceId>,
    current: Option<PlaceId>,
    page_cursor: Option<String>,
    error: Option<String>,
    list_fetch: FetchSlot,
    detail_fetch: FetchSlot,
    list_epoch: u64,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loading(&self) -> bool {
        self.list_fetch.is_active() || self.detail_fetch.is_active()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn page_cursor(&self) -> Option<&str> {
        self.page_cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.page_cursor.is_some()
    }

    /// Listed places in arrival order. Duplicate ids appear once per arrival.
    pub fn places(&self) -> impl Iterator<Item = &PlaceRecord> + '_ {
        self.list.iter().filter_map(|id| self.records.get(id))
    }

    pub(crate) fn place_count(&self) -> usize {
        self.list.len()
    }

    pub fn place_at(&self, index: usize) -> Option<&PlaceRecord> {
        self.list.get(index).and_then(|id| self.records.get(id))
    }

    pub fn current_place(&self) -> Option<&PlaceRecord> {
        self.current.as_ref().and_then(|id| self.records.get(id))
    }

    pub(crate) fn record(&self, id: &PlaceId) -> Option<&PlaceRecord> {
        self.records.get(id)
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            places: self.places().cloned().collect(),
            loading: self.loading(),
            error: self.error.clone(),
            page_cursor: self.page_cursor.clone(),
            current_place: self.current_place().cloned(),
        }
    }

    /// Starts a list fetch for the current cursor unless any fetch is outstanding.
    pub fn begin_list_fetch(&mut self) -> Option<ListFetch> {
        if self.loading() {
            return None;
        }
        Some(self.issue_list_fetch())
    }

    /// Clears the list and fetches the first page, superseding any outstanding
    /// list fetch. An outstanding detail fetch is left to finish.
    pub fn restart_list_fetch(&mut self) -> ListFetch {
        self.reset_list();
        self.issue_list_fetch()
    }

    fn issue_list_fetch(&mut self) -> ListFetch {
        self.error = None;
        let generation = self.list_fetch.begin();
        ListFetch {
            ticket: FetchTicket {
                kind: FetchKind::List,
                generation,
                list_epoch: self.list_epoch,
            },
            cursor: self.page_cursor.clone(),
        }
    }

    pub fn finish_list_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<SearchPage, FetchError>,
        visited: &VisitedSet,
    ) -> FetchOutcome {
        if ticket.kind != FetchKind::List || !self.list_fetch.complete(ticket.generation) {
            return FetchOutcome::Stale;
        }
        if ticket.list_epoch != self.list_epoch {
            debug!(
                generation = ticket.generation,
                "catalog: dropping page fetched before list reset"
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(page) => {
                for mut record in page.records {
                    record.reconcile(visited);
                    self.list.push(record.id.clone());
                    self.records.insert(record.id.clone(), record);
                }
                self.page_cursor = page.next_cursor;
                FetchOutcome::Applied
            }
            Err(err) => {
                self.error = Some(err.user_message());
                FetchOutcome::Failed
            }
        }
    }

    /// Starts a detail fetch, superseding any outstanding one.
    pub fn begin_detail_fetch(&mut self) -> FetchTicket {
        self.error = None;
        FetchTicket {
            kind: FetchKind::Detail,
            generation: self.detail_fetch.begin(),
            list_epoch: self.list_epoch,
        }
    }

    pub fn finish_detail_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<PlaceRecord, FetchError>,
        visited: &VisitedSet,
    ) -> FetchOutcome {
        if ticket.kind != FetchKind::Detail || !self.detail_fetch.complete(ticket.generation) {
            return FetchOutcome::Stale;
        }

        match result {
            Ok(mut record) => {
                record.reconcile(visited);
                self.current = Some(record.id.clone());
                self.records.insert(record.id.clone(), record);
                self.prune();
                FetchOutcome::Applied
            }
            Err(err) => {
                self.error = Some(err.user_message());
                FetchOutcome::Failed
            }
        }
    }

    /// Flips the canonical record for `id`. Returns the new flag, or `None`
    /// when neither the list nor the detail view holds that id.
    pub fn toggle_visited(&mut self, id: &PlaceId) -> Option<bool> {
        let record = self.records.get_mut(id)?;
        record.visited = !record.visited;
        Some(record.visited)
    }

    pub fn reset_list(&mut self) {
        self.list.clear();
        self.page_cursor = None;
        self.list_epoch += 1;
        self.prune();
    }

    /// The visited set always wins over local flags.
    pub fn sync_visited(&mut self, visited: &VisitedSet) {
        for record in self.records.values_mut() {
            record.reconcile(visited);
        }
    }

    fn prune(&mut self) {
        let mut keep: HashSet<&PlaceId> = self.list.iter().collect();
        keep.extend(self.current.as_ref());
        self.records.retain(|id, _| keep.contains(id));
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
