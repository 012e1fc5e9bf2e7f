use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::config::InterviewConfig;

use super::domain::{
    AgentId, ApplicationAccepted, CandidateId, Interview, InterviewId, InterviewStatus, RecruiterId,
};
use super::error::InterviewError;
use super::lifecycle::StatusChange;
use super::notify::{publish_terminal, PipelineNotifier};
use super::provider::{AgentInstructions, CallContext, CallGateway, GatewayError};
use super::store::{ChangeOutcome, InterviewStore};

/// Scheduling knobs for new interviews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub validity: Duration,
    pub eager_provisioning: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            validity: Duration::days(7),
            eager_provisioning: true,
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &InterviewConfig) -> Self {
        Self {
            validity: config.validity,
            eager_provisioning: config.eager_provisioning,
        }
    }
}

/// Creates interviews and places their calls.
pub struct DispatchOrchestrator<S> {
    store: Arc<S>,
    gateway: Arc<dyn CallGateway>,
    notifier: Arc<dyn PipelineNotifier>,
    settings: DispatchSettings,
    starting: Mutex<HashSet<InterviewId>>,
}

/// Marks an interview as having a start underway; released on drop.
struct StartClaim<'a> {
    starting: &'a Mutex<HashSet<InterviewId>>,
    id: InterviewId,
}

impl Drop for StartClaim<'_> {
    fn drop(&mut self) {
        let mut starting = self
            .starting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        starting.remove(&self.id);
    }
}

impl<S> DispatchOrchestrator<S>
where
    S: InterviewStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn CallGateway>,
        notifier: Arc<dyn PipelineNotifier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            settings,
            starting: Mutex::new(HashSet::new()),
        }
    }

    /// Create a scheduled interview for an accepted application. Agent provisioning is
    /// attempted up front when enabled; a failure only defers it to `start_interview`.
    pub async fn schedule_interview(
        &self,
        accepted: ApplicationAccepted,
        now: DateTime<Utc>,
    ) -> Result<Interview, InterviewError> {
        if accepted.job_id.0.trim().is_empty() || accepted.candidate_id.0.trim().is_empty() {
            return Err(InterviewError::InvalidInput(
                "job_id and candidate_id are required".to_string(),
            ));
        }
        if accepted.job_context.title.trim().is_empty() {
            return Err(InterviewError::InvalidInput(
                "job_context.title is required".to_string(),
            ));
        }

        let interview = self
            .store
            .insert(Interview::schedule(accepted, now, self.settings.validity))?;
        tracing::info!(
            interview_id = %interview.id,
            expires_at = %interview.expires_at,
            "interview scheduled"
        );

        if !self.settings.eager_provisioning {
            return Ok(interview);
        }

        match self.provision(&interview).await {
            Ok(agent_id) => {
                let agent_id = self.store.attach_agent(&interview.id, agent_id)?;
                Ok(Interview {
                    agent_id: Some(agent_id),
                    ..interview
                })
            }
            Err(err) => {
                tracing::warn!(
                    interview_id = %interview.id,
                    error = %err,
                    "eager agent provisioning failed, deferring to start"
                );
                Ok(interview)
            }
        }
    }

    /// Place the screening call for `id` on behalf of `candidate_id`.
    pub async fn start_interview(
        &self,
        id: &InterviewId,
        candidate_id: &CandidateId,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Interview, InterviewError> {
        // Held until the call is recorded or the start fails.
        let _claim = self.claim_start(id)?;

        let interview = self
            .store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))?;

        if &interview.candidate_id != candidate_id {
            return Err(InterviewError::Unauthorized(format!(
                "interview {id} belongs to another candidate"
            )));
        }
        if interview.status != InterviewStatus::Scheduled {
            return Err(InterviewError::conflict(id, interview.status));
        }
        if interview.is_past_expiry(now) {
            return Err(self.expire_on_start(&interview, now)?);
        }

        let phone_number = normalize_phone(phone_number)?;

        let agent_id = match interview.agent_id.clone() {
            Some(agent_id) => agent_id,
            None => {
                let provisioned = self.provision(&interview).await.map_err(|source| {
                    InterviewError::DependencyFailure {
                        operation: "agent provisioning",
                        source,
                    }
                })?;
                self.store.attach_agent(id, provisioned)?
            }
        };

        let context = CallContext::for_interview(&interview);
        let call_id = self
            .gateway
            .dispatch_call(&agent_id, &phone_number, &context)
            .await
            .map_err(|source| {
                tracing::warn!(interview_id = %id, error = %source, "call dispatch failed");
                InterviewError::DependencyFailure {
                    operation: "call dispatch",
                    source,
                }
            })?;

        let change = StatusChange::Start {
            call_id: call_id.clone(),
            started_at: now,
        };
        match self.store.apply(id, change)? {
            ChangeOutcome::Applied(started) => {
                tracing::info!(
                    interview_id = %id,
                    call_id = %call_id,
                    attempt = started.attempt_count,
                    "interview call dispatched"
                );
                Ok(started)
            }
            ChangeOutcome::Rejected { current, .. } => {
                tracing::warn!(
                    interview_id = %id,
                    call_id = %call_id,
                    status = %current.status,
                    "call dispatched but interview changed status meanwhile"
                );
                Err(InterviewError::conflict(id, current.status))
            }
        }
    }

    /// Cancel a live interview on behalf of the recruiter who owns it.
    pub fn cancel_interview(
        &self,
        id: &InterviewId,
        recruiter_id: &RecruiterId,
        now: DateTime<Utc>,
    ) -> Result<Interview, InterviewError> {
        let interview = self
            .store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))?;

        if &interview.recruiter_id != recruiter_id {
            return Err(InterviewError::Unauthorized(format!(
                "interview {id} belongs to another recruiter"
            )));
        }

        match self.store.apply(id, StatusChange::Cancel { at: now })? {
            ChangeOutcome::Applied(cancelled) => {
                tracing::info!(interview_id = %id, previous = %interview.status, "interview cancelled");
                publish_terminal(self.notifier.as_ref(), &cancelled);
                Ok(cancelled)
            }
            ChangeOutcome::Rejected { current, .. } => {
                Err(InterviewError::conflict(id, current.status))
            }
        }
    }

    fn claim_start(&self, id: &InterviewId) -> Result<StartClaim<'_>, InterviewError> {
        let mut starting = self
            .starting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !starting.insert(id.clone()) {
            tracing::warn!(interview_id = %id, "start rejected, another start is in progress");
            return Err(InterviewError::StartPending(id.clone()));
        }
        Ok(StartClaim {
            starting: &self.starting,
            id: id.clone(),
        })
    }

    async fn provision(&self, interview: &Interview) -> Result<AgentId, GatewayError> {
        let instructions =
            AgentInstructions::for_interview(&interview.job_context, interview.cv_summary.as_deref());
        let agent_id = self.gateway.create_agent(&instructions).await?;
        tracing::debug!(interview_id = %interview.id, agent_id = %agent_id.0, "agent provisioned");
        Ok(agent_id)
    }

    fn expire_on_start(
        &self,
        interview: &Interview,
        now: DateTime<Utc>,
    ) -> Result<InterviewError, InterviewError> {
        let change = StatusChange::Expire {
            at: now,
            from: interview.status,
        };
        let status = match self.store.apply(&interview.id, change)? {
            ChangeOutcome::Applied(expired) => {
                tracing::info!(interview_id = %expired.id, "start requested after expiry, interview expired");
                publish_terminal(self.notifier.as_ref(), &expired);
                expired.status
            }
            ChangeOutcome::Rejected { current, .. } => current.status,
        };
        Ok(InterviewError::conflict(&interview.id, status))
    }
}

/// Normalize a phone number to E.164: a leading `+` (or `00`) followed by 8 to 15 digits.
/// Spaces, dashes, dots and parentheses are ignored.
pub fn normalize_phone(raw: &str) -> Result<String, InterviewError> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest
    } else {
        return Err(InterviewError::InvalidInput(
            "phone number must include a country code".to_string(),
        ));
    };

    let valid = (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    if !valid {
        return Err(InterviewError::InvalidInput(format!(
            "'{}' is not a valid international phone number",
            raw.trim()
        )));
    }

    Ok(format!("+{digits}"))
}
