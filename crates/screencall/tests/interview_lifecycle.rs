//! End-to-end interview scenarios driven through the public service, engine and router.
//!
//! The call provider and transcript analyzer are replaced with in-process fakes; everything else
//! is the production wiring.

mod common {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use screencall::workflows::interviews::analysis::{AnalysisRequest, AnalyzerError};
    use screencall::workflows::interviews::provider::{
        AgentInstructions, CallContext, CallState, CallStatusReport, ProviderReport,
    };
    use screencall::workflows::interviews::{
        AgentId, ApplicationAccepted, CallAnalysis, CallGateway, CallId, CandidateId,
        CompletionService, DispatchOrchestrator, DispatchSettings, GatewayError,
        InMemoryInterviewStore, JobContext, JobId, PipelineNotifier, PipelineUpdate,
        ReconcilePolicy, ReconciliationEngine, Recommendation, RecruiterId, TranscriptAnalyzer,
    };
    use screencall::workflows::interviews::NotifyError;

    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    pub fn application() -> ApplicationAccepted {
        ApplicationAccepted {
            job_id: JobId("job-9".to_string()),
            candidate_id: CandidateId("cand-3".to_string()),
            recruiter_id: RecruiterId("rec-5".to_string()),
            job_context: JobContext {
                title: "Site Reliability Engineer".to_string(),
                company: "Northwind".to_string(),
                description: "Keep the checkout path up.".to_string(),
                requirements: vec!["Kubernetes".to_string()],
            },
            cv_summary: None,
            candidate_name: Some("Sam Ortiz".to_string()),
        }
    }

    /// Provider whose status endpoint is either healthy (per-call scripted state) or down.
    #[derive(Default)]
    pub struct FakeProvider {
        pub down: std::sync::atomic::AtomicBool,
        calls: AtomicUsize,
        finished: Mutex<HashMap<CallId, String>>,
    }

    impl FakeProvider {
        pub fn finish(&self, call_id: &CallId, transcript: &str) {
            self.finished
                .lock()
                .expect("provider mutex poisoned")
                .insert(call_id.clone(), transcript.to_string());
        }
    }

    #[async_trait]
    impl CallGateway for FakeProvider {
        async fn create_agent(
            &self,
            instructions: &AgentInstructions,
        ) -> Result<AgentId, GatewayError> {
            Ok(AgentId(format!("agent-for-{}", instructions.name.len())))
        }

        async fn dispatch_call(
            &self,
            _agent_id: &AgentId,
            _phone_number: &str,
            _context: &CallContext,
        ) -> Result<CallId, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CallId(format!("call-{n}")))
        }

        async fn call_status(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GatewayError::Api {
                    status: 503,
                    message: "maintenance".to_string(),
                });
            }
            let transcript = self
                .finished
                .lock()
                .expect("provider mutex poisoned")
                .get(call_id)
                .cloned();
            Ok(match transcript {
                Some(transcript) => CallStatusReport {
                    state: CallState::Finished,
                    raw_status: "completed".to_string(),
                    transcript: Some(transcript),
                    duration_secs: Some(240),
                },
                None => CallStatusReport {
                    state: CallState::Active,
                    raw_status: "ongoing".to_string(),
                    transcript: None,
                    duration_secs: None,
                },
            })
        }

        async fn call_analytics(&self, call_id: &CallId) -> Result<ProviderReport, GatewayError> {
            Err(GatewayError::NotFound(format!("analytics for {call_id}")))
        }
    }

    pub struct FixedAnalyzer {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl TranscriptAnalyzer for FixedAnalyzer {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.transcript.trim().is_empty() {
                return Err(AnalyzerError::Malformed("empty transcript".to_string()));
            }
            Ok(CallAnalysis {
                technical_score: 88,
                communication_score: 84,
                confidence_score: 80,
                overall_score: 84,
                strengths: vec!["incident response".to_string()],
                weaknesses: vec![],
                recommendation: Recommendation::Hire,
                summary: "Strong operational background.".to_string(),
            })
        }
    }

    #[derive(Default)]
    pub struct Inbox {
        pub updates: Mutex<Vec<PipelineUpdate>>,
    }

    impl PipelineNotifier for Inbox {
        fn publish(&self, update: PipelineUpdate) -> Result<(), NotifyError> {
            self.updates
                .lock()
                .expect("inbox mutex poisoned")
                .push(update);
            Ok(())
        }
    }

    pub struct World {
        pub provider: Arc<FakeProvider>,
        pub analyzer: Arc<FixedAnalyzer>,
        pub inbox: Arc<Inbox>,
        pub dispatch: DispatchOrchestrator<InMemoryInterviewStore>,
        pub engine: Arc<ReconciliationEngine<InMemoryInterviewStore>>,
        pub store: Arc<InMemoryInterviewStore>,
    }

    pub fn world() -> World {
        let store = Arc::new(InMemoryInterviewStore::new());
        let provider = Arc::new(FakeProvider::default());
        let analyzer = Arc::new(FixedAnalyzer {
            calls: AtomicUsize::new(0),
        });
        let inbox = Arc::new(Inbox::default());

        let dispatch = DispatchOrchestrator::new(
            store.clone(),
            provider.clone(),
            inbox.clone(),
            DispatchSettings::default(),
        );
        let completion = CompletionService::new(
            store.clone(),
            analyzer.clone(),
            inbox.clone(),
            Duration::from_secs(2),
        );
        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            provider.clone(),
            completion,
            ReconcilePolicy::default(),
        ));

        World {
            provider,
            analyzer,
            inbox,
            dispatch,
            engine,
            store,
        }
    }
}

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::*;
use screencall::workflows::interviews::{
    interview_router, AnalysisSource, CallWebhook, CandidateId, Completion, CompletionTrigger,
    InterviewError, InterviewService, InterviewStatus, InterviewStore, PipelineStage,
};

const PHONE: &str = "+44 20 7946 0958";

#[tokio::test]
async fn webhook_path_completes_with_analysis() {
    let w = world();
    let interview = w
        .dispatch
        .schedule_interview(application(), at(9, 0))
        .await
        .expect("schedule");
    let started = w
        .dispatch
        .start_interview(&interview.id, &CandidateId("cand-3".to_string()), PHONE, at(9, 5))
        .await
        .expect("start");
    let call_id = started.call_id.clone().expect("call attached");

    let webhook: CallWebhook = serde_json::from_value(json!({
        "callId": call_id.0,
        "transcript": "AI: How do you handle a paging storm?\nUser: Triage, silence duplicates, fix the root cause.",
        "durationSeconds": "240"
    }))
    .expect("webhook parses");

    let completion = w
        .engine
        .handle_webhook(webhook, at(9, 15))
        .await
        .expect("webhook handled");

    let done = completion.interview();
    assert_eq!(done.status, InterviewStatus::Completed);
    let result = done.result.as_ref().expect("result");
    assert_eq!(result.analysis.overall_score, 84);
    assert_eq!(result.analysis_source, AnalysisSource::Analyzer);
    assert_eq!(result.duration_secs, 240);
    assert_eq!(result.questions.len(), 1);
    assert_eq!(
        result.questions[0].question,
        "How do you handle a paging storm?"
    );

    let updates = w.inbox.updates.lock().expect("inbox").clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].stage, PipelineStage::Interviewed);
    assert_eq!(updates[0].overall_score, Some(84));
}

#[tokio::test]
async fn unreachable_provider_is_force_completed_after_staleness() {
    let w = world();
    let interview = w
        .dispatch
        .schedule_interview(application(), at(9, 0))
        .await
        .expect("schedule");
    w.dispatch
        .start_interview(&interview.id, &CandidateId("cand-3".to_string()), PHONE, at(9, 0))
        .await
        .expect("start");
    w.provider.down.store(true, Ordering::SeqCst);

    for minute in [16, 17, 18] {
        w.engine.poll_once(at(9, minute)).await.expect("poll");
    }

    let stored = w
        .store
        .fetch(&interview.id)
        .expect("store")
        .expect("interview");
    assert_eq!(stored.status, InterviewStatus::Completed);
    let result = stored.result.expect("placeholder result");
    assert_eq!(result.trigger, CompletionTrigger::StalenessTier);
    assert_eq!(result.analysis.overall_score, 50);
    assert!(result.analysis.requires_manual_review());
    assert_eq!(w.analyzer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn polled_completion_is_not_repeated_by_a_late_webhook() {
    let w = world();
    let interview = w
        .dispatch
        .schedule_interview(application(), at(9, 0))
        .await
        .expect("schedule");
    let started = w
        .dispatch
        .start_interview(&interview.id, &CandidateId("cand-3".to_string()), PHONE, at(9, 1))
        .await
        .expect("start");
    let call_id = started.call_id.expect("call attached");
    w.provider
        .finish(&call_id, "Agent: Ready to begin?\nCandidate: Yes.");

    let report = w.engine.poll_once(at(9, 20)).await.expect("poll");
    assert_eq!(report.completed, 1);

    let late: CallWebhook =
        serde_json::from_value(json!({ "call_id": call_id.0, "technical_score": 10 }))
            .expect("webhook parses");
    let outcome = w
        .engine
        .handle_webhook(late, at(9, 30))
        .await
        .expect("late webhook handled");

    assert!(matches!(outcome, Completion::AlreadyTerminal(_)));
    let stored = w
        .store
        .fetch(&interview.id)
        .expect("store")
        .expect("interview");
    assert_eq!(stored.completed_at, Some(at(9, 20)));
    assert_eq!(
        stored.result.map(|result| result.trigger),
        Some(CompletionTrigger::Poll)
    );
    assert_eq!(w.analyzer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn starting_after_expiry_reports_expired() {
    let w = world();
    let interview = w
        .dispatch
        .schedule_interview(application(), at(9, 0))
        .await
        .expect("schedule");

    let err = w
        .dispatch
        .start_interview(
            &interview.id,
            &CandidateId("cand-3".to_string()),
            PHONE,
            interview.expires_at,
        )
        .await
        .expect_err("expired");

    assert!(matches!(
        err,
        InterviewError::StateConflict {
            status: InterviewStatus::Expired,
            ..
        }
    ));
}

#[tokio::test]
async fn http_surface_schedules_and_reports_status() {
    let w = world();
    let service = std::sync::Arc::new(InterviewService::new(
        w.store.clone(),
        w.dispatch,
        w.engine,
        None,
    ));
    let app = interview_router(service);

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/interviews")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&application()).expect("serialize"),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body");
    let created: serde_json::Value = serde_json::from_slice(&body).expect("json");
    let id = created["interview_id"].as_str().expect("id").to_string();

    let response = app
        .oneshot(
            Request::get(format!("/api/v1/interviews/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
