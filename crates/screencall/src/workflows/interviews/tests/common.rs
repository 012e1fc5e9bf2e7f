use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::interviews::analysis::{AnalysisRequest, AnalyzerError, TranscriptAnalyzer};
use crate::workflows::interviews::dispatch::{DispatchOrchestrator, DispatchSettings};
use crate::workflows::interviews::domain::{
    AgentId, ApplicationAccepted, CallAnalysis, CallId, CandidateId, Interview, InterviewId,
    InterviewStatus, JobContext, JobId, Recommendation, RecruiterId,
};
use crate::workflows::interviews::lifecycle::StatusChange;
use crate::workflows::interviews::notify::{NotifyError, PipelineNotifier, PipelineUpdate};
use crate::workflows::interviews::provider::{
    AgentInstructions, CallContext, CallGateway, CallState, CallStatusReport, GatewayError,
    ProviderReport,
};
use crate::workflows::interviews::reconciliation::{
    CompletionService, ReconcilePolicy, ReconciliationEngine,
};
use crate::workflows::interviews::service::InterviewService;
use crate::workflows::interviews::store::{
    ChangeOutcome, InMemoryInterviewStore, InterviewStore, StoreError,
};

pub(super) const PHONE: &str = "+1 (555) 123-4567";

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

pub(super) fn accepted() -> ApplicationAccepted {
    ApplicationAccepted {
        job_id: JobId("job-42".to_string()),
        candidate_id: CandidateId("cand-7".to_string()),
        recruiter_id: RecruiterId("rec-1".to_string()),
        job_context: JobContext {
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            description: "Own the payments API.".to_string(),
            requirements: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        },
        cv_summary: Some("Six years building APIs in Go and Rust.".to_string()),
        candidate_name: Some("Dana Reyes".to_string()),
    }
}

pub(super) fn candidate() -> CandidateId {
    CandidateId("cand-7".to_string())
}

pub(super) fn recruiter() -> RecruiterId {
    RecruiterId("rec-1".to_string())
}

pub(super) fn scored_analysis(technical: u8, communication: u8, confidence: u8) -> CallAnalysis {
    let overall =
        ((u16::from(technical) + u16::from(communication) + u16::from(confidence) + 1) / 3) as u8;
    CallAnalysis {
        technical_score: technical,
        communication_score: communication,
        confidence_score: confidence,
        overall_score: overall,
        strengths: vec!["clear examples".to_string()],
        weaknesses: vec!["limited testing depth".to_string()],
        recommendation: Recommendation::from_overall_score(overall),
        summary: "Solid screen.".to_string(),
    }
}

pub(super) fn finished(transcript: &str) -> CallStatusReport {
    CallStatusReport {
        state: CallState::Finished,
        raw_status: "ended".to_string(),
        transcript: Some(transcript.to_string()),
        duration_secs: Some(312),
    }
}

pub(super) fn active() -> CallStatusReport {
    CallStatusReport {
        state: CallState::Active,
        raw_status: "in-progress".to_string(),
        transcript: None,
        duration_secs: None,
    }
}

/// Scripted reply for `call_status`.
#[derive(Clone)]
pub(super) enum StatusScript {
    Reply(CallStatusReport),
    Timeout,
    Missing,
    /// Never answers; only the engine's own timeout ends the query.
    Hang,
}

/// Call gateway whose answers are set by the test.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    pub(super) fail_agent: AtomicBool,
    pub(super) fail_dispatch: AtomicBool,
    pub(super) agents_created: AtomicUsize,
    pub(super) status_queries: AtomicUsize,
    pub(super) dispatched: Mutex<Vec<(AgentId, String)>>,
    call_ids: Mutex<VecDeque<String>>,
    statuses: Mutex<HashMap<CallId, StatusScript>>,
    analytics: Mutex<HashMap<CallId, ProviderReport>>,
}

impl ScriptedGateway {
    pub(super) fn next_call(&self, call_id: &str) {
        self.call_ids
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(call_id.to_string());
    }

    pub(super) fn script_status(&self, call_id: &str, script: StatusScript) {
        self.statuses
            .lock()
            .expect("gateway mutex poisoned")
            .insert(CallId(call_id.to_string()), script);
    }

    pub(super) fn script_analytics(&self, call_id: &str, report: ProviderReport) {
        self.analytics
            .lock()
            .expect("gateway mutex poisoned")
            .insert(CallId(call_id.to_string()), report);
    }

    pub(super) fn dispatched(&self) -> Vec<(AgentId, String)> {
        self.dispatched.lock().expect("gateway mutex poisoned").clone()
    }
}

#[async_trait]
impl CallGateway for ScriptedGateway {
    async fn create_agent(&self, _instructions: &AgentInstructions) -> Result<AgentId, GatewayError> {
        tokio::task::yield_now().await;
        if self.fail_agent.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                message: "agent service down".to_string(),
            });
        }
        let n = self.agents_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AgentId(format!("agent-{n}")))
    }

    async fn dispatch_call(
        &self,
        agent_id: &AgentId,
        phone_number: &str,
        _context: &CallContext,
    ) -> Result<CallId, GatewayError> {
        tokio::task::yield_now().await;
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err(GatewayError::RateLimited {
                retry_after_ms: 1000,
            });
        }
        let mut dispatched = self.dispatched.lock().expect("gateway mutex poisoned");
        dispatched.push((agent_id.clone(), phone_number.to_string()));
        let scripted = self
            .call_ids
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front();
        Ok(CallId(
            scripted.unwrap_or_else(|| format!("call-{}", dispatched.len())),
        ))
    }

    async fn call_status(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let script = self
            .statuses
            .lock()
            .expect("gateway mutex poisoned")
            .get(call_id)
            .cloned()
            .unwrap_or(StatusScript::Reply(active()));
        match script {
            StatusScript::Reply(report) => Ok(report),
            StatusScript::Timeout => Err(GatewayError::Timeout),
            StatusScript::Missing => Err(GatewayError::NotFound(format!("call {call_id}"))),
            StatusScript::Hang => std::future::pending().await,
        }
    }

    async fn call_analytics(&self, call_id: &CallId) -> Result<ProviderReport, GatewayError> {
        self.analytics
            .lock()
            .expect("gateway mutex poisoned")
            .get(call_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("analytics for {call_id}")))
    }
}

/// Analyzer returning a fixed analysis, or failing when none is set.
#[derive(Default)]
pub(super) struct ScriptedAnalyzer {
    pub(super) reply: Mutex<Option<CallAnalysis>>,
    pub(super) calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub(super) fn replying(analysis: CallAnalysis) -> Self {
        Self {
            reply: Mutex::new(Some(analysis)),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent completions interleave.
        tokio::task::yield_now().await;
        self.reply
            .lock()
            .expect("analyzer mutex poisoned")
            .clone()
            .ok_or(AnalyzerError::Quota)
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    updates: Mutex<Vec<PipelineUpdate>>,
}

impl RecordingNotifier {
    pub(super) fn updates(&self) -> Vec<PipelineUpdate> {
        self.updates.lock().expect("notifier mutex poisoned").clone()
    }
}

impl PipelineNotifier for RecordingNotifier {
    fn publish(&self, update: PipelineUpdate) -> Result<(), NotifyError> {
        self.updates
            .lock()
            .expect("notifier mutex poisoned")
            .push(update);
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl InterviewStore for UnavailableStore {
    fn insert(&self, _interview: Interview) -> Result<Interview, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &InterviewId) -> Result<Option<Interview>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find_by_call(&self, _call_id: &CallId) -> Result<Option<Interview>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list_by_status(&self, _status: InterviewStatus) -> Result<Vec<Interview>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn attach_agent(&self, _id: &InterviewId, _agent_id: AgentId) -> Result<AgentId, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn apply(&self, _id: &InterviewId, _change: StatusChange) -> Result<ChangeOutcome, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

/// Fully wired engine over in-memory fakes.
pub(super) struct Harness<S: InterviewStore + 'static = InMemoryInterviewStore> {
    pub(super) store: Arc<S>,
    pub(super) gateway: Arc<ScriptedGateway>,
    pub(super) analyzer: Arc<ScriptedAnalyzer>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) dispatch: DispatchOrchestrator<S>,
    pub(super) engine: Arc<ReconciliationEngine<S>>,
}

pub(super) fn harness() -> Harness {
    harness_with(
        Arc::new(InMemoryInterviewStore::new()),
        ScriptedAnalyzer::replying(scored_analysis(80, 70, 75)),
        ReconcilePolicy::default(),
    )
}

pub(super) fn harness_with<S: InterviewStore + 'static>(
    store: Arc<S>,
    analyzer: ScriptedAnalyzer,
    policy: ReconcilePolicy,
) -> Harness<S> {
    let gateway = Arc::new(ScriptedGateway::default());
    let analyzer = Arc::new(analyzer);
    let notifier = Arc::new(RecordingNotifier::default());

    let dispatch = DispatchOrchestrator::new(
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        DispatchSettings::default(),
    );
    let completion = CompletionService::new(
        store.clone(),
        analyzer.clone(),
        notifier.clone(),
        StdDuration::from_secs(5),
    );
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        gateway.clone(),
        completion,
        policy,
    ));

    Harness {
        store,
        gateway,
        analyzer,
        notifier,
        dispatch,
        engine,
    }
}

impl<S: InterviewStore + 'static> Harness<S> {
    /// Schedule at `t0` and start at `t0 + 1 min` with the given call id.
    pub(super) async fn started(&self, call_id: &str) -> Interview {
        let interview = self
            .dispatch
            .schedule_interview(accepted(), t0())
            .await
            .expect("schedule succeeds");
        self.gateway.next_call(call_id);
        self.dispatch
            .start_interview(&interview.id, &candidate(), PHONE, t0() + minutes(1))
            .await
            .expect("start succeeds")
    }

    pub(super) fn fetch(&self, id: &InterviewId) -> Interview {
        self.store
            .fetch(id)
            .expect("store reachable")
            .expect("interview exists")
    }

    pub(super) fn into_service(self) -> Arc<InterviewService<S>> {
        Arc::new(InterviewService::new(
            self.store.clone(),
            self.dispatch,
            self.engine,
            None,
        ))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
