use std::sync::Arc;

use chrono::Utc;
use subtle::ConstantTimeEq;

use super::dispatch::DispatchOrchestrator;
use super::domain::{ApplicationAccepted, CandidateId, Interview, InterviewId, RecruiterId};
use super::error::InterviewError;
use super::reconciliation::{
    CallWebhook, Completion, InFlightView, ReconcileReport, ReconciliationEngine,
};
use super::store::InterviewStore;

/// Service composing the dispatch orchestrator, reconciliation engine and store behind the
/// HTTP surface.
pub struct InterviewService<S> {
    store: Arc<S>,
    dispatch: DispatchOrchestrator<S>,
    engine: Arc<ReconciliationEngine<S>>,
    webhook_secret: Option<String>,
}

impl<S> InterviewService<S>
where
    S: InterviewStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        dispatch: DispatchOrchestrator<S>,
        engine: Arc<ReconciliationEngine<S>>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            dispatch,
            engine,
            webhook_secret: webhook_secret.filter(|secret| !secret.is_empty()),
        }
    }

    /// Shared engine handle, used to start the periodic scheduler.
    pub fn engine(&self) -> Arc<ReconciliationEngine<S>> {
        self.engine.clone()
    }

    pub async fn schedule(&self, accepted: ApplicationAccepted) -> Result<Interview, InterviewError> {
        self.dispatch.schedule_interview(accepted, Utc::now()).await
    }

    pub async fn start(
        &self,
        id: &InterviewId,
        candidate_id: &CandidateId,
        phone_number: &str,
    ) -> Result<Interview, InterviewError> {
        self.dispatch
            .start_interview(id, candidate_id, phone_number, Utc::now())
            .await
    }

    pub fn get(&self, id: &InterviewId) -> Result<Interview, InterviewError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))
    }

    pub fn cancel(
        &self,
        id: &InterviewId,
        recruiter_id: &RecruiterId,
    ) -> Result<Interview, InterviewError> {
        self.dispatch.cancel_interview(id, recruiter_id, Utc::now())
    }

    /// Check the shared secret carried by a webhook request. Open when no secret is configured.
    pub fn verify_webhook(&self, provided: Option<&str>) -> Result<(), InterviewError> {
        match (&self.webhook_secret, provided) {
            (None, _) => Ok(()),
            (Some(expected), Some(provided))
                if bool::from(expected.as_bytes().ct_eq(provided.trim().as_bytes())) =>
            {
                Ok(())
            }
            (Some(_), _) => Err(InterviewError::Unauthorized(
                "webhook secret missing or invalid".to_string(),
            )),
        }
    }

    pub async fn ingest_webhook(&self, payload: CallWebhook) -> Result<Completion, InterviewError> {
        self.engine.handle_webhook(payload, Utc::now()).await
    }

    pub fn in_flight(&self) -> Result<Vec<InFlightView>, InterviewError> {
        self.engine.in_flight(Utc::now())
    }

    pub async fn force_reconcile(&self, id: &InterviewId) -> Result<ReconcileReport, InterviewError> {
        self.engine.force_reconcile(id, Utc::now()).await
    }
}
