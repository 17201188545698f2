use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::api::JobBackend;
use crate::error::{AppError, RequestError};
use crate::filter::{FilterCriteria, derive};
use crate::form::JobDraft;
use crate::models::{Credentials, JobApplication, JobId, NewJobApplication, Status};
use crate::session::{SavedSessionAction, Session, SessionGate};
use crate::store::{FetchOutcome, FetchTicket, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient message for the user, the terminal equivalent of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// A backend write, prepared and checked before it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(NewJobApplication),
    /// Save of the edit form; ends editing on success.
    Update { id: JobId, record: JobApplication },
    SetStatus { id: JobId, record: JobApplication },
    Delete(JobId),
}

impl Mutation {
    pub async fn execute<B: JobBackend + ?Sized>(&self, backend: &B) -> Result<(), RequestError> {
        match self {
            Mutation::Create(job) => backend.create(job).await,
            Mutation::Update { id, record } | Mutation::SetStatus { id, record } => {
                backend.update(id, record).await
            }
            Mutation::Delete(id) => backend.delete(id).await,
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "Application added!",
            Mutation::Update { .. } => "Application updated!",
            Mutation::SetStatus { .. } => "Status updated!",
            Mutation::Delete(_) => "Application deleted!",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Mutation::Create(_) | Mutation::Update { .. } => "Failed to save job application",
            Mutation::SetStatus { .. } => "Failed to update status",
            Mutation::Delete(_) => "Failed to delete job",
        }
    }
}

/// Single owner of session, store and filter state. Every user action goes
/// through here; every failure becomes a notice.
#[derive(Debug)]
pub struct Tracker<B> {
    backend: B,
    gate: SessionGate,
    store: Store,
    criteria: FilterCriteria,
    notices: VecDeque<Notice>,
}

impl<B: JobBackend> Tracker<B> {
    pub fn with_gate(backend: B, gate: SessionGate) -> Self {
        Self {
            backend,
            gate,
            store: Store::new(),
            criteria: FilterCriteria::default(),
            notices: VecDeque::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session(&self) -> &Session {
        self.gate.session()
    }

    pub fn saved_session_action(&self) -> SavedSessionAction {
        self.gate.saved_session_action()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut FilterCriteria {
        &mut self.criteria
    }

    /// The derived view, recomputed from the current collection and criteria.
    pub fn view(&self) -> Vec<JobApplication> {
        derive(self.store.collection(), &self.criteria)
    }

    // --- notices ---

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        debug!(?level, %message, "notice");
        self.notices.push_back(Notice { level, message });
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn block_unauthenticated(&mut self) -> Result<(), AppError> {
        if self.gate.require_auth() {
            return Ok(());
        }
        let err = AppError::Unauthenticated("add applications");
        self.notify(NoticeLevel::Error, err.to_string());
        Err(err)
    }

    // --- session ---

    /// Asks the backend whether the session is valid; loads the collection
    /// when it is and empties it when it is not. An error means the session
    /// is valid but the collection could not be loaded.
    pub async fn check_session(&mut self) -> Result<bool, AppError> {
        if self.gate.check_session(&self.backend).await {
            self.refresh().await?;
            Ok(true)
        } else {
            self.store.clear();
            Ok(false)
        }
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), AppError> {
        match self.gate.login(&self.backend, credentials).await {
            Ok(message) => {
                self.notify(NoticeLevel::Success, message);
                self.reload().await;
                Ok(())
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn register(&mut self, credentials: &Credentials) -> Result<(), AppError> {
        match self.gate.register(&self.backend, credentials).await {
            Ok(message) => {
                self.notify(NoticeLevel::Success, message);
                Ok(())
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn logout(&mut self) -> Result<(), AppError> {
        match self.gate.logout(&self.backend).await {
            Ok(()) => {
                self.store.clear();
                self.notify(NoticeLevel::Success, "Logged out successfully");
                Ok(())
            }
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    // --- fetching ---

    pub fn issue_fetch(&mut self) -> FetchTicket {
        self.store.issue_fetch()
    }

    /// Applies a `list()` response unless it is stale: issued before the
    /// last logout, superseded by a newer response, or arriving while no
    /// session is active.
    pub fn finish_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<JobApplication>, RequestError>,
    ) -> Result<FetchOutcome, AppError> {
        if !self.gate.is_authenticated() {
            warn!("discarding job list response for a logged-out session");
            return Ok(FetchOutcome::Stale);
        }
        match self.store.complete_fetch(ticket, result) {
            FetchOutcome::Failed(source) => {
                let message = "Failed to fetch jobs";
                self.notify(NoticeLevel::Error, message);
                Err(AppError::Fetch {
                    message: message.to_string(),
                    source,
                })
            }
            outcome => {
                if let FetchOutcome::Applied { count } = outcome {
                    info!(count, "job list refreshed");
                }
                Ok(outcome)
            }
        }
    }

    pub async fn refresh(&mut self) -> Result<FetchOutcome, AppError> {
        let ticket = self.issue_fetch();
        let result = self.backend.list().await;
        self.finish_fetch(ticket, result)
    }

    /// Re-fetch after an action that already succeeded. A failure here is
    /// reported as a notice only.
    async fn reload(&mut self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "reload after action failed");
        }
    }

    // --- editing ---

    /// Starts editing `id` and returns the form pre-populated from it.
    pub fn begin_edit(&mut self, id: &JobId) -> Result<JobDraft, AppError> {
        if !self.store.begin_edit(id) {
            return Err(AppError::UnknownJob(id.to_string()));
        }
        Ok(self.draft())
    }

    pub fn end_edit(&mut self) {
        self.store.end_edit();
    }

    /// The form for the current edit, or a blank one.
    pub fn draft(&self) -> JobDraft {
        JobDraft::for_editing(self.store.editing_record())
    }

    // --- mutations ---

    pub fn prepare_submit(&mut self, draft: &JobDraft) -> Result<Mutation, AppError> {
        self.block_unauthenticated()?;
        let job = match draft.validate() {
            Ok(job) => job,
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                return Err(e.into());
            }
        };
        Ok(match self.store.editing_id() {
            Some(id) => Mutation::Update {
                id: id.clone(),
                record: job.into_record(id.clone()),
            },
            None => Mutation::Create(job),
        })
    }

    /// The full record with only its status changed: the backend has no
    /// partial update.
    pub fn prepare_status_update(&mut self, id: &JobId, status: Status) -> Result<Mutation, AppError> {
        self.block_unauthenticated()?;
        let record = self
            .store
            .get(id)
            .map(|job| job.with_status(status))
            .ok_or_else(|| AppError::UnknownJob(id.to_string()))?;
        Ok(Mutation::SetStatus {
            id: id.clone(),
            record,
        })
    }

    pub fn prepare_delete(&mut self, id: &JobId) -> Result<Mutation, AppError> {
        self.block_unauthenticated()?;
        Ok(Mutation::Delete(id.clone()))
    }

    /// Records the outcome of a sent mutation. The caller must re-fetch on
    /// success; nothing is patched locally.
    pub fn finish_mutation(
        &mut self,
        mutation: &Mutation,
        result: Result<(), RequestError>,
    ) -> Result<(), AppError> {
        match result {
            Ok(()) => {
                if matches!(mutation, Mutation::Update { .. } | Mutation::Create(_)) {
                    self.store.end_edit();
                }
                self.notify(NoticeLevel::Success, mutation.success_message());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "mutation failed");
                let message = mutation.failure_message();
                self.notify(NoticeLevel::Error, message);
                Err(AppError::Mutation {
                    message: message.to_string(),
                    source: e,
                })
            }
        }
    }

    pub async fn apply(&mut self, mutation: Mutation) -> Result<(), AppError> {
        let result = mutation.execute(&self.backend).await;
        self.finish_mutation(&mutation, result)?;
        self.reload().await;
        Ok(())
    }

    /// Creates a record, or saves the one being edited.
    pub async fn submit(&mut self, draft: &JobDraft) -> Result<(), AppError> {
        let mutation = self.prepare_submit(draft)?;
        self.apply(mutation).await
    }

    pub async fn update_status(&mut self, id: &JobId, status: Status) -> Result<(), AppError> {
        let mutation = self.prepare_status_update(id, status)?;
        self.apply(mutation).await
    }

    pub async fn delete(&mut self, id: &JobId) -> Result<(), AppError> {
        let mutation = self.prepare_delete(id)?;
        self.apply(mutation).await
    }
}
