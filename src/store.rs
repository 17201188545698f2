use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::models::{JobApplication, JobId};

/// Identifies one outstanding `list()` call. Only tickets from the current
/// session epoch that are not older than the last applied response may
/// replace the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
    seq: u64,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Applied { count: usize },
    Failed(RequestError),
    Stale,
}

/// The single owner of the in-memory job collection. The collection is
/// only ever replaced wholesale.
#[derive(Debug, Default)]
pub struct Store {
    collection: Vec<JobApplication>,
    editing_id: Option<JobId>,
    epoch: u64,
    next_seq: u64,
    applied_seq: Option<u64>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self) -> &[JobApplication] {
        &self.collection
    }

    pub fn get(&self, id: &JobId) -> Option<&JobApplication> {
        self.collection.iter().find(|job| &job.id == id)
    }

    pub fn replace_collection(&mut self, items: Vec<JobApplication>) {
        let mut seen = HashSet::new();
        let total = items.len();
        self.collection = items
            .into_iter()
            .filter(|job| seen.insert(job.id.clone()))
            .collect();
        if self.collection.len() != total {
            warn!(
                dropped = total - self.collection.len(),
                "backend returned duplicate job ids"
            );
        }
        if let Some(id) = &self.editing_id {
            if self.get(id).is_none() {
                debug!(%id, "record being edited is gone");
                self.editing_id = None;
            }
        }
    }

    // --- editing ---

    /// Returns false, leaving state untouched, when no record has this id.
    pub fn begin_edit(&mut self, id: &JobId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.editing_id = Some(id.clone());
        true
    }

    pub fn end_edit(&mut self) {
        self.editing_id = None;
    }

    pub fn editing_id(&self) -> Option<&JobId> {
        self.editing_id.as_ref()
    }

    pub fn editing_record(&self) -> Option<&JobApplication> {
        self.editing_id.as_ref().and_then(|id| self.get(id))
    }

    // --- fetch bookkeeping ---

    pub fn issue_fetch(&mut self) -> FetchTicket {
        let ticket = FetchTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        ticket
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.epoch == self.epoch && self.applied_seq.is_none_or(|applied| ticket.seq >= applied)
    }

    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<JobApplication>, RequestError>,
    ) -> FetchOutcome {
        if !self.is_current(ticket) {
            warn!(seq = ticket.seq, "discarding stale job list response");
            return FetchOutcome::Stale;
        }
        self.applied_seq = Some(ticket.seq);

        match result {
            Ok(items) => {
                self.replace_collection(items);
                FetchOutcome::Applied {
                    count: self.collection.len(),
                }
            }
            Err(e) => {
                warn!(error = %e, "job list fetch failed");
                self.collection.clear();
                self.editing_id = None;
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Empties the store and invalidates every outstanding fetch.
    pub fn clear(&mut self) {
        self.collection.clear();
        self.editing_id = None;
        self.epoch += 1;
        self.applied_seq = None;
    }
}
