use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::completion::{Completion, CompletionService};
use super::payload::{CallOutcome, CallWebhook};
use crate::config::ReconciliationConfig;
use crate::workflows::interviews::domain::{
    CallId, CompletionTrigger, Interview, InterviewId, InterviewStatus, InterviewView,
};
use crate::workflows::interviews::error::InterviewError;
use crate::workflows::interviews::provider::{
    CallGateway, CallStatusReport, GatewayError, ProviderReport,
};
use crate::workflows::interviews::store::InterviewStore;

const STALENESS_NOTE: &str =
    "The call provider stopped responding; the interview was closed without call data.";
const HARD_CEILING_NOTE: &str =
    "The interview exceeded the maximum in-flight time and was closed automatically.";
const SWEEP_NOTE: &str =
    "The interview was still open at the staleness sweep and was closed automatically.";

/// Time limits and worker bounds applied by the poll and the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub staleness: Duration,
    pub expiry_ceiling: Duration,
    pub hard_ceiling: Duration,
    pub failure_threshold: u32,
    pub sweep_after: Duration,
    pub concurrency: usize,
    pub gateway_timeout: StdDuration,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            staleness: Duration::minutes(15),
            expiry_ceiling: Duration::hours(1),
            hard_ceiling: Duration::hours(24),
            failure_threshold: 3,
            sweep_after: Duration::hours(3),
            concurrency: 4,
            gateway_timeout: StdDuration::from_secs(15),
        }
    }
}

impl ReconcilePolicy {
    pub fn from_config(config: &ReconciliationConfig, gateway_timeout: StdDuration) -> Self {
        Self {
            staleness: config.staleness,
            expiry_ceiling: config.expiry_ceiling,
            hard_ceiling: config.hard_ceiling,
            failure_threshold: config.failure_threshold.max(1),
            sweep_after: config.sweep_after,
            concurrency: config.concurrency.max(1),
            gateway_timeout,
        }
    }
}

/// Per-interview record of how the provider has been answering status queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CallHealth {
    consecutive_failures: u32,
    last_status: Option<String>,
    last_error: Option<String>,
    last_checked: Option<DateTime<Utc>>,
}

/// Decision taken for one in-progress interview during a poll evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollAction {
    Completed,
    Synthesized,
    ForcedTimeout,
    Expired,
    Waiting,
    AlreadyTerminal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub examined: usize,
    pub completed: usize,
    pub synthesized: usize,
    pub forced: usize,
    pub expired_in_flight: usize,
    pub expired_scheduled: usize,
    pub waiting: usize,
    pub errors: usize,
}

impl PollReport {
    fn record(&mut self, action: PollAction) {
        match action {
            PollAction::Completed => self.completed += 1,
            PollAction::Synthesized => self.synthesized += 1,
            PollAction::ForcedTimeout => self.forced += 1,
            PollAction::Expired => self.expired_in_flight += 1,
            PollAction::Waiting | PollAction::AlreadyTerminal => self.waiting += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub recovered: usize,
    pub forced: usize,
    pub errors: usize,
}

/// Result of a manual reconcile of one interview.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub action: PollAction,
    pub interview: InterviewView,
}

/// Operator view of one in-flight interview.
#[derive(Debug, Clone, Serialize)]
pub struct InFlightView {
    pub interview_id: InterviewId,
    pub call_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_minutes: i64,
    pub attempt_count: u32,
    pub consecutive_failures: u32,
    pub last_gateway_status: Option<String>,
    pub last_error: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub suggestion: String,
}

/// Drives interviews from `in_progress` to a terminal status from three directions: webhooks,
/// the periodic poll and the staleness sweep.
pub struct ReconciliationEngine<S> {
    store: Arc<S>,
    gateway: Arc<dyn CallGateway>,
    completion: CompletionService<S>,
    policy: ReconcilePolicy,
    health: Mutex<HashMap<InterviewId, CallHealth>>,
}

impl<S> ReconciliationEngine<S>
where
    S: InterviewStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn CallGateway>,
        completion: CompletionService<S>,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            completion,
            policy,
            health: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    pub fn completion(&self) -> &CompletionService<S> {
        &self.completion
    }

    /// Ingest a call-completed webhook. Duplicate deliveries are harmless.
    pub async fn handle_webhook(
        &self,
        payload: CallWebhook,
        now: DateTime<Utc>,
    ) -> Result<Completion, InterviewError> {
        let call_id = payload.call_id.trim();
        if call_id.is_empty() {
            return Err(InterviewError::InvalidInput("call_id is required".to_string()));
        }
        let call_id = CallId(call_id.to_string());

        let interview = self
            .store
            .find_by_call(&call_id)?
            .ok_or_else(|| InterviewError::NotFound(format!("call {call_id}")))?;

        if interview.status.is_terminal() {
            tracing::debug!(
                interview_id = %interview.id,
                call_id = %call_id,
                status = %interview.status,
                "webhook for terminal interview ignored"
            );
            return Ok(Completion::AlreadyTerminal(interview));
        }
        if interview.call_id.as_ref() != Some(&call_id) {
            tracing::warn!(
                interview_id = %interview.id,
                call_id = %call_id,
                "webhook for a superseded call attempt"
            );
        }

        let outcome = CallOutcome::from_report(CompletionTrigger::Webhook, &payload.report);
        let completion = self.completion.complete(&interview.id, outcome, now).await?;
        self.forget(&interview.id);
        Ok(completion)
    }

    /// One poll cycle: expire overdue scheduled interviews, then evaluate every in-progress one
    /// with bounded concurrency.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollReport, InterviewError> {
        let mut report = PollReport::default();

        for interview in self.store.list_by_status(InterviewStatus::Scheduled)? {
            if !interview.is_past_expiry(now) {
                continue;
            }
            match self.completion.expire(&interview, now) {
                Ok(Some(_)) => report.expired_scheduled += 1,
                Ok(None) => {}
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(interview_id = %interview.id, error = %err, "expiry failed");
                }
            }
        }

        let in_flight = self.store.list_by_status(InterviewStatus::InProgress)?;
        report.examined = in_flight.len();
        self.retain_health(&in_flight);

        let results: Vec<(InterviewId, Result<PollAction, InterviewError>)> =
            stream::iter(in_flight)
                .map(|interview| async move {
                    let id = interview.id.clone();
                    (id, self.evaluate(interview, now).await)
                })
                .buffer_unordered(self.policy.concurrency.max(1))
                .collect()
                .await;

        for (id, result) in results {
            match result {
                Ok(action) => report.record(action),
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(interview_id = %id, error = %err, "poll evaluation failed");
                }
            }
        }

        if report.examined > 0 || report.expired_scheduled > 0 {
            tracing::info!(
                examined = report.examined,
                completed = report.completed,
                synthesized = report.synthesized,
                forced = report.forced,
                expired = report.expired_in_flight + report.expired_scheduled,
                errors = report.errors,
                "reconciliation poll finished"
            );
        }

        Ok(report)
    }

    /// Evaluate one in-progress interview.
    ///
    /// Precedence: a finished call from the provider, then the hard ceiling, then the
    /// staleness tier (repeated provider failures), then the expiry ceiling.
    pub async fn evaluate(
        &self,
        interview: Interview,
        now: DateTime<Utc>,
    ) -> Result<PollAction, InterviewError> {
        if interview.status != InterviewStatus::InProgress {
            return Ok(PollAction::AlreadyTerminal);
        }

        let elapsed = interview.elapsed_in_flight(now);
        let probe = match &interview.call_id {
            Some(call_id) => self.probe(call_id).await,
            None => Err(GatewayError::NotFound("call reference".to_string())),
        };

        let failures = match probe {
            Ok(status) => {
                self.record_success(&interview.id, &status.raw_status, now);
                if status.state.is_terminal() {
                    let analytics = self.analytics(&interview).await;
                    let outcome = CallOutcome::from_status(
                        CompletionTrigger::Poll,
                        status,
                        analytics.as_ref(),
                    );
                    return self
                        .finish(&interview.id, outcome, now, PollAction::Completed)
                        .await;
                }
                0
            }
            Err(err) => {
                // A 404 may mean the provider already purged a finished call.
                tracing::debug!(interview_id = %interview.id, error = %err, "call status unavailable");
                self.record_failure(&interview.id, &err, now)
            }
        };

        if elapsed >= self.policy.hard_ceiling {
            let outcome = CallOutcome::placeholder(CompletionTrigger::HardCeiling, HARD_CEILING_NOTE);
            return self
                .finish(&interview.id, outcome, now, PollAction::ForcedTimeout)
                .await;
        }

        if failures >= self.policy.failure_threshold && elapsed >= self.policy.staleness {
            tracing::warn!(
                interview_id = %interview.id,
                failures,
                elapsed_minutes = elapsed.num_minutes(),
                "provider unreachable past staleness tier, synthesizing completion"
            );
            let outcome = CallOutcome::placeholder(CompletionTrigger::StalenessTier, STALENESS_NOTE);
            return self
                .finish(&interview.id, outcome, now, PollAction::Synthesized)
                .await;
        }

        if elapsed >= self.policy.expiry_ceiling && failures < self.policy.failure_threshold {
            return match self.completion.expire(&interview, now)? {
                Some(_) => {
                    self.forget(&interview.id);
                    Ok(PollAction::Expired)
                }
                None => Ok(PollAction::AlreadyTerminal),
            };
        }

        Ok(PollAction::Waiting)
    }

    /// Close interviews stuck in flight past the sweep bound, preferring real call data.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<SweepReport, InterviewError> {
        let mut report = SweepReport::default();
        let stale: Vec<Interview> = self
            .store
            .list_by_status(InterviewStatus::InProgress)?
            .into_iter()
            .filter(|interview| interview.elapsed_in_flight(now) >= self.policy.sweep_after)
            .collect();

        for interview in stale {
            report.examined += 1;

            let status = match &interview.call_id {
                Some(call_id) => self.probe(call_id).await.ok(),
                None => None,
            };
            let (outcome, recovered) = match status {
                Some(status) if status.state.is_terminal() => {
                    let analytics = self.analytics(&interview).await;
                    let outcome = CallOutcome::from_status(
                        CompletionTrigger::SweepRecovered,
                        status,
                        analytics.as_ref(),
                    );
                    (outcome, true)
                }
                _ => (
                    CallOutcome::placeholder(CompletionTrigger::SweepForced, SWEEP_NOTE),
                    false,
                ),
            };

            match self.completion.complete(&interview.id, outcome, now).await {
                Ok(Completion::Completed(_)) if recovered => report.recovered += 1,
                Ok(Completion::Completed(_)) => report.forced += 1,
                Ok(Completion::AlreadyTerminal(_)) => {}
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(interview_id = %interview.id, error = %err, "sweep completion failed");
                }
            }
            self.forget(&interview.id);
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                recovered = report.recovered,
                forced = report.forced,
                "staleness sweep finished"
            );
        }
        Ok(report)
    }

    /// Run one poll evaluation for a single interview, outside the periodic schedule.
    pub async fn force_reconcile(
        &self,
        id: &InterviewId,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, InterviewError> {
        let interview = self
            .store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))?;

        let action = match interview.status {
            InterviewStatus::InProgress => self.evaluate(interview, now).await?,
            InterviewStatus::Scheduled if interview.is_past_expiry(now) => {
                match self.completion.expire(&interview, now)? {
                    Some(_) => PollAction::Expired,
                    None => PollAction::AlreadyTerminal,
                }
            }
            InterviewStatus::Scheduled => PollAction::Waiting,
            _ => PollAction::AlreadyTerminal,
        };

        let interview = self
            .store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))?;
        Ok(ReconcileReport {
            action,
            interview: interview.view(),
        })
    }

    /// Snapshot of every in-progress interview with what the engine last saw of it.
    pub fn in_flight(&self, now: DateTime<Utc>) -> Result<Vec<InFlightView>, InterviewError> {
        let interviews = self.store.list_by_status(InterviewStatus::InProgress)?;
        let health = self.health.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(interviews
            .into_iter()
            .map(|interview| {
                let record = health.get(&interview.id).cloned().unwrap_or_default();
                let elapsed = interview.elapsed_in_flight(now);
                InFlightView {
                    suggestion: self.suggestion(elapsed, &record),
                    interview_id: interview.id,
                    call_id: interview.call_id.map(|call| call.0),
                    started_at: interview.started_at,
                    elapsed_minutes: elapsed.num_minutes(),
                    attempt_count: interview.attempt_count,
                    consecutive_failures: record.consecutive_failures,
                    last_gateway_status: record.last_status,
                    last_error: record.last_error,
                    last_checked: record.last_checked,
                }
            })
            .collect())
    }

    fn suggestion(&self, elapsed: Duration, health: &CallHealth) -> String {
        let policy = &self.policy;
        let failing = health.consecutive_failures >= policy.failure_threshold;

        if elapsed >= policy.hard_ceiling {
            "Past the hard ceiling; the next poll force-completes it with a timeout placeholder."
                .to_string()
        } else if failing && elapsed >= policy.staleness {
            "Provider unreachable past the staleness tier; the next poll synthesizes a completion."
                .to_string()
        } else if failing {
            format!(
                "Provider unreachable; a placeholder completion follows after {} minutes in flight.",
                policy.staleness.num_minutes()
            )
        } else if elapsed >= policy.expiry_ceiling {
            "No completion signal past the expiry ceiling; the next poll expires it.".to_string()
        } else if let Some(status) = &health.last_status {
            format!("Call is '{status}'; waiting for the webhook or the next poll.")
        } else {
            "Not polled yet; force a reconcile to query the provider now.".to_string()
        }
    }

    async fn finish(
        &self,
        id: &InterviewId,
        outcome: CallOutcome,
        now: DateTime<Utc>,
        action: PollAction,
    ) -> Result<PollAction, InterviewError> {
        let completion = self.completion.complete(id, outcome, now).await?;
        self.forget(id);
        Ok(match completion {
            Completion::Completed(_) => action,
            Completion::AlreadyTerminal(_) => PollAction::AlreadyTerminal,
        })
    }

    async fn probe(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError> {
        match tokio::time::timeout(self.policy.gateway_timeout, self.gateway.call_status(call_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    async fn analytics(&self, interview: &Interview) -> Option<ProviderReport> {
        let call_id = interview.call_id.as_ref()?;
        let fetched =
            tokio::time::timeout(self.policy.gateway_timeout, self.gateway.call_analytics(call_id))
                .await
                .unwrap_or(Err(GatewayError::Timeout));
        match fetched {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(
                    interview_id = %interview.id,
                    error = %err,
                    "call analytics unavailable, completing with status data"
                );
                None
            }
        }
    }

    fn record_success(&self, id: &InterviewId, status: &str, now: DateTime<Utc>) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = health.entry(id.clone()).or_default();
        entry.consecutive_failures = 0;
        entry.last_status = Some(status.to_string());
        entry.last_error = None;
        entry.last_checked = Some(now);
    }

    fn record_failure(&self, id: &InterviewId, err: &GatewayError, now: DateTime<Utc>) -> u32 {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = health.entry(id.clone()).or_default();
        entry.consecutive_failures += 1;
        entry.last_error = Some(err.to_string());
        entry.last_checked = Some(now);
        entry.consecutive_failures
    }

    /// Drop health for calls that left `in_progress` without passing through the engine,
    /// such as operator cancellations.
    fn retain_health(&self, in_flight: &[Interview]) {
        let live: HashSet<&InterviewId> = in_flight.iter().map(|interview| &interview.id).collect();
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| live.contains(id));
    }

    #[cfg(test)]
    pub(crate) fn tracked_calls(&self) -> usize {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn forget(&self, id: &InterviewId) {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}
