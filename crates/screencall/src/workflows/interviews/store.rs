use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{AgentId, CallId, Interview, InterviewId, InterviewStatus};
use super::lifecycle::{apply_change, StatusChange, TransitionRejected};

/// Result of a conditional status change.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    /// The change was applied; carries the updated interview.
    Applied(Interview),
    /// The interview's current status does not allow the change; carries the unchanged record.
    Rejected {
        current: Interview,
        reason: TransitionRejected,
    },
}

/// Storage abstraction for interviews.
///
/// `apply` must be atomic with respect to the status check: two concurrent completions of the
/// same interview must result in exactly one `Applied`.
pub trait InterviewStore: Send + Sync {
    fn insert(&self, interview: Interview) -> Result<Interview, StoreError>;
    fn fetch(&self, id: &InterviewId) -> Result<Option<Interview>, StoreError>;
    fn find_by_call(&self, call_id: &CallId) -> Result<Option<Interview>, StoreError>;
    fn list_by_status(&self, status: InterviewStatus) -> Result<Vec<Interview>, StoreError>;
    /// Record a provisioned agent unless one is already present. Returns the agent in effect.
    fn attach_agent(&self, id: &InterviewId, agent_id: AgentId) -> Result<AgentId, StoreError>;
    fn apply(&self, id: &InterviewId, change: StatusChange) -> Result<ChangeOutcome, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
struct Tables {
    interviews: HashMap<InterviewId, Interview>,
    calls: HashMap<CallId, InterviewId>,
}

/// Process-local store guarded by a single mutex, which makes `apply` a compare-and-set.
#[derive(Default)]
pub struct InMemoryInterviewStore {
    tables: Mutex<Tables>,
}

impl InMemoryInterviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("interview store lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|tables| tables.interviews.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InterviewStore for InMemoryInterviewStore {
    fn insert(&self, interview: Interview) -> Result<Interview, StoreError> {
        let mut tables = self.lock()?;
        if tables.interviews.contains_key(&interview.id) {
            return Err(StoreError::Conflict);
        }
        if let Some(call_id) = &interview.call_id {
            tables.calls.insert(call_id.clone(), interview.id.clone());
        }
        tables
            .interviews
            .insert(interview.id.clone(), interview.clone());
        Ok(interview)
    }

    fn fetch(&self, id: &InterviewId) -> Result<Option<Interview>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.interviews.get(id).cloned())
    }

    fn find_by_call(&self, call_id: &CallId) -> Result<Option<Interview>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .calls
            .get(call_id)
            .and_then(|id| tables.interviews.get(id))
            .cloned())
    }

    fn list_by_status(&self, status: InterviewStatus) -> Result<Vec<Interview>, StoreError> {
        let tables = self.lock()?;
        let mut matching: Vec<Interview> = tables
            .interviews
            .values()
            .filter(|interview| interview.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    fn attach_agent(&self, id: &InterviewId, agent_id: AgentId) -> Result<AgentId, StoreError> {
        let mut tables = self.lock()?;
        let interview = tables.interviews.get_mut(id).ok_or(StoreError::NotFound)?;
        let agent = interview.agent_id.get_or_insert(agent_id);
        Ok(agent.clone())
    }

    fn apply(&self, id: &InterviewId, change: StatusChange) -> Result<ChangeOutcome, StoreError> {
        let mut tables = self.lock()?;
        let interview = tables.interviews.get_mut(id).ok_or(StoreError::NotFound)?;

        let new_call = match &change {
            StatusChange::Start { call_id, .. } => Some(call_id.clone()),
            _ => None,
        };

        let mut updated = interview.clone();
        if let Err(reason) = apply_change(&mut updated, change) {
            return Ok(ChangeOutcome::Rejected {
                current: interview.clone(),
                reason,
            });
        }
        *interview = updated.clone();

        if let Some(call_id) = new_call {
            tables.calls.insert(call_id, id.clone());
        }

        Ok(ChangeOutcome::Applied(updated))
    }
}
