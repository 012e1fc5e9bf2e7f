use crate::infra::{build_service, in_memory_store, Collaborators, ServiceSettings};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use clap::{Args, ValueEnum};
use screencall::error::AppError;
use screencall::workflows::interviews::analysis::{
    extract_from_transcript, AnalysisRequest, AnalyzerError,
};
use screencall::workflows::interviews::provider::{
    AgentInstructions, CallContext, CallState, CallStatusReport, ProviderReport,
};
use screencall::workflows::interviews::{
    AgentId, ApplicationAccepted, CallAnalysis, CallGateway, CallId, CallWebhook, CandidateId,
    GatewayError, InterviewView, JobContext, JobId, NotifyError, PipelineNotifier,
    PipelineUpdate, Recommendation, RecruiterId, TranscriptAnalyzer,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DEMO_TRANSCRIPT: &str = "\
Agent: Thanks for taking the call. Can you walk me through a system you designed recently?
Candidate: I led the rewrite of our billing pipeline from nightly batches to an event stream.
Agent: How did you make sure the new pipeline was correct?
Candidate: Property tests on the ledger invariants and two weeks of shadow traffic.
Agent: What would you do differently next time?
Candidate: Start the data migration plan much earlier.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Scenario {
    /// The provider posts the call-completed webhook
    #[default]
    Webhook,
    /// No webhook arrives; the poll finds the finished call
    Poll,
    /// The provider stops answering; the staleness tier closes the interview
    Stale,
    /// The candidate never picks up the link before it expires
    Expired,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Which reconciliation path to exercise
    #[arg(long, value_enum, default_value_t = Scenario::Webhook)]
    pub(crate) scenario: Scenario,
    /// Candidate phone number, any common formatting
    #[arg(long, default_value = "+1 (415) 555-0100")]
    pub(crate) phone: String,
    /// Print the full result, including transcript and question list
    #[arg(long)]
    pub(crate) verbose: bool,
}

/// In-process stand-in for the voice provider. Calls ring once, then finish with a canned
/// transcript unless the provider is marked down.
#[derive(Default)]
pub(crate) struct SimulatedProvider {
    pub(crate) down: AtomicBool,
    agents: AtomicUsize,
    calls: AtomicUsize,
    queries: AtomicUsize,
}

#[async_trait]
impl CallGateway for SimulatedProvider {
    async fn create_agent(&self, instructions: &AgentInstructions) -> Result<AgentId, GatewayError> {
        let n = self.agents.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  provider: agent #{n} provisioned for \"{}\"", instructions.name);
        Ok(AgentId(format!("sim-agent-{n}")))
    }

    async fn dispatch_call(
        &self,
        _agent_id: &AgentId,
        phone_number: &str,
        context: &CallContext,
    ) -> Result<CallId, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "  provider: dialing {phone_number} for {} ({})",
            context.candidate_name, context.job_title
        );
        Ok(CallId(format!("sim-call-{n}")))
    }

    async fn call_status(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                message: format!("status for {call_id} unavailable"),
            });
        }
        let query = self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(if query == 0 {
            CallStatusReport {
                state: CallState::Active,
                raw_status: "ringing".to_string(),
                transcript: None,
                duration_secs: None,
            }
        } else {
            CallStatusReport {
                state: CallState::from_provider("ended"),
                raw_status: "ended".to_string(),
                transcript: Some(DEMO_TRANSCRIPT.to_string()),
                duration_secs: Some(287),
            }
        })
    }

    async fn call_analytics(&self, call_id: &CallId) -> Result<ProviderReport, GatewayError> {
        Err(GatewayError::NotFound(format!("analytics for {call_id}")))
    }
}

/// Deterministic analyzer: rewards answered questions and substantive replies.
pub(crate) struct SimulatedAnalyzer;

#[async_trait]
impl TranscriptAnalyzer for SimulatedAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError> {
        let pairs = extract_from_transcript(&request.transcript);
        if pairs.is_empty() {
            return Err(AnalyzerError::Malformed("no question/answer pairs".to_string()));
        }
        let answered: Vec<&str> = pairs
            .iter()
            .filter_map(|pair| pair.answer.as_deref())
            .collect();
        let words: usize = answered.iter().map(|a| a.split_whitespace().count()).sum();
        let average_words = words / answered.len().max(1);

        let technical = (55 + 10 * answered.len()).min(95) as u8;
        let communication = (50 + 3 * average_words).min(95) as u8;
        let confidence = 72;
        let overall = ((u16::from(technical) + u16::from(communication) + confidence + 1) / 3) as u8;

        Ok(CallAnalysis {
            technical_score: technical,
            communication_score: communication,
            confidence_score: confidence as u8,
            overall_score: overall,
            strengths: vec![format!("answered {} of {} questions", answered.len(), pairs.len())],
            weaknesses: if answered.len() < pairs.len() {
                vec!["left questions unanswered".to_string()]
            } else {
                Vec::new()
            },
            recommendation: Recommendation::from_overall_score(overall),
            summary: format!(
                "{} discussed {} topics for the {} role.",
                request.candidate_label,
                pairs.len(),
                request.job.title
            ),
        })
    }
}

#[derive(Default)]
struct PrintingNotifier {
    updates: Mutex<Vec<PipelineUpdate>>,
}

impl PipelineNotifier for PrintingNotifier {
    fn publish(&self, update: PipelineUpdate) -> Result<(), NotifyError> {
        println!(
            "  pipeline: {} -> {:?} (score {:?})",
            update.candidate_id.0, update.stage, update.overall_score
        );
        self.updates
            .lock()
            .map_err(|_| NotifyError::Transport("demo notifier poisoned".to_string()))?
            .push(update);
        Ok(())
    }
}

fn demo_application() -> ApplicationAccepted {
    ApplicationAccepted {
        job_id: JobId("job-demo".to_string()),
        candidate_id: CandidateId("cand-demo".to_string()),
        recruiter_id: RecruiterId("rec-demo".to_string()),
        job_context: JobContext {
            title: "Platform Engineer".to_string(),
            company: "Example Logistics".to_string(),
            description: "Own the event pipeline that feeds billing and routing.".to_string(),
            requirements: vec!["Rust or Go".to_string(), "Event streaming".to_string()],
        },
        cv_summary: Some("Seven years on payment and billing back ends.".to_string()),
        candidate_name: Some("Jordan Lee".to_string()),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        scenario,
        phone,
        verbose,
    } = args;

    let provider = Arc::new(SimulatedProvider::default());
    let notifier = Arc::new(PrintingNotifier::default());
    let service = build_service(
        ServiceSettings::default(),
        in_memory_store(),
        Collaborators {
            gateway: provider.clone(),
            analyzer: Arc::new(SimulatedAnalyzer),
            notifier: notifier.clone(),
        },
    );
    let engine = service.engine();

    println!("Interview screening demo ({scenario:?})");
    let scheduled = service.schedule(demo_application()).await?;
    println!(
        "- scheduled {} (expires {})",
        scheduled.id,
        scheduled.expires_at.format("%Y-%m-%d %H:%M UTC")
    );

    if scenario == Scenario::Expired {
        let later = scheduled.expires_at + Duration::minutes(1);
        let report = engine.poll_once(later).await?;
        println!("- poll after expiry: {} expired", report.expired_scheduled);
        render(&service.get(&scheduled.id)?.view(), verbose);
        return Ok(());
    }

    let started = service
        .start(&scheduled.id, &scheduled.candidate_id, &phone)
        .await?;
    let call_id = started
        .call_id
        .clone()
        .ok_or_else(|| GatewayError::Malformed("call reference missing after start".to_string()))?;
    println!("- started, call {call_id}");
    let t0 = started.started_at.unwrap_or_else(Utc::now);

    match scenario {
        Scenario::Webhook => {
            let payload: CallWebhook = serde_json::from_value(serde_json::json!({
                "call_id": call_id.0,
                "transcript": DEMO_TRANSCRIPT,
                "duration_seconds": 287,
            }))
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;
            engine.handle_webhook(payload, t0 + Duration::minutes(6)).await?;
            println!("- webhook delivered");
        }
        Scenario::Poll => {
            for minute in [2, 7] {
                let report = engine.poll_once(t0 + Duration::minutes(minute)).await?;
                println!(
                    "- poll at +{minute}m: {} waiting, {} completed",
                    report.waiting, report.completed
                );
            }
        }
        Scenario::Stale => {
            provider.down.store(true, Ordering::SeqCst);
            for minute in [16, 17, 18] {
                let report = engine.poll_once(t0 + Duration::minutes(minute)).await?;
                println!(
                    "- poll at +{minute}m with provider down: {} waiting, {} synthesized",
                    report.waiting, report.synthesized
                );
            }
        }
        Scenario::Expired => {}
    }

    render(&service.get(&scheduled.id)?.view(), verbose);
    let delivered = notifier
        .updates
        .lock()
        .map(|updates| updates.len())
        .unwrap_or_default();
    println!("{delivered} pipeline update(s) published");
    Ok(())
}

fn render(view: &InterviewView, verbose: bool) {
    println!("\nInterview {}", view.interview_id);
    println!("  status: {}", view.status);
    println!("  attempts: {}", view.attempt_count);
    if let Some(score) = view.overall_score {
        println!("  overall score: {score}");
    }
    if let Some(recommendation) = view.recommendation {
        println!("  recommendation: {recommendation}");
    }
    if let Some(result) = &view.result {
        println!(
            "  trigger: {:?}, analysis: {:?}",
            result.trigger, result.analysis_source
        );
        println!("  summary: {}", result.analysis.summary);
        if verbose {
            for (index, pair) in result.questions.iter().enumerate() {
                println!("  Q{}: {}", index + 1, pair.question);
                if let Some(answer) = &pair.answer {
                    println!("     {answer}");
                }
            }
            match serde_json::to_string_pretty(result) {
                Ok(json) => println!("{json}"),
                Err(err) => println!("  (result not printable: {err})"),
            }
        }
    }
}
