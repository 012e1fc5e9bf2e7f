//! AI phone-screening interviews: lifecycle, call dispatch and reconciliation of call outcomes.

pub mod analysis;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod provider;
pub mod reconciliation;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use analysis::{HttpTranscriptAnalyzer, TranscriptAnalyzer};
pub use dispatch::{normalize_phone, DispatchOrchestrator, DispatchSettings};
pub use domain::{
    AgentId, AnalysisSource, ApplicationAccepted, CallAnalysis, CallId, CandidateId,
    CompletionTrigger, Interview, InterviewId, InterviewResult, InterviewStatus, InterviewView,
    JobContext, JobId, QuestionAnswer, Recommendation, RecruiterId,
};
pub use error::InterviewError;
pub use lifecycle::{next_status, InterviewEvent, StatusChange, TransitionRejected};
pub use notify::{LoggingNotifier, NotifyError, PipelineNotifier, PipelineStage, PipelineUpdate};
pub use provider::{CallGateway, GatewayError, HttpCallGateway};
pub use reconciliation::{
    CallWebhook, Completion, CompletionService, ReconcilePolicy, ReconciliationEngine,
    ReconciliationScheduler, SchedulerError,
};
pub use router::interview_router;
pub use service::InterviewService;
pub use store::{ChangeOutcome, InMemoryInterviewStore, InterviewStore, StoreError};
