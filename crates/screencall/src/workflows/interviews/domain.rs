use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for tracked interviews.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterviewId(pub String);

impl InterviewId {
    pub fn generate() -> Self {
        Self(format!("int-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for InterviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a job owned by the application subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Opaque reference to the candidate being screened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Opaque reference to the recruiter who owns the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecruiterId(pub String);

/// Provider-side agent configuration reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

/// Provider-side reference to one dispatched call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an interview. See `lifecycle` for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Scheduled,
    InProgress,
    Completed,
    Expired,
    Cancelled,
}

impl InterviewStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InterviewStatus::Scheduled => "scheduled",
            InterviewStatus::InProgress => "in_progress",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Expired => "expired",
            InterviewStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            InterviewStatus::Completed | InterviewStatus::Expired | InterviewStatus::Cancelled
        )
    }
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Job details frozen at scheduling time so later job edits never leak into a running interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// Hiring recommendation attached to every completed interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongHire,
    Hire,
    Neutral,
    NoHire,
}

impl Recommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Recommendation::StrongHire => "strong_hire",
            Recommendation::Hire => "hire",
            Recommendation::Neutral => "neutral",
            Recommendation::NoHire => "no_hire",
        }
    }

    /// Lenient parse of vendor recommendation strings. Unknown values map to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "strong_hire" | "strong_yes" | "strongly_recommend" | "strongly_recommended"
            | "definitely" => Some(Self::StrongHire),
            "hire" | "yes" | "recommend" | "recommended" | "proceed" | "advance" => {
                Some(Self::Hire)
            }
            "neutral" | "maybe" | "consider" | "undecided" | "hold" => Some(Self::Neutral),
            "no_hire" | "no" | "reject" | "rejected" | "not_recommended" | "do_not_proceed" => {
                Some(Self::NoHire)
            }
            _ => None,
        }
    }

    pub fn from_overall_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => Self::StrongHire,
            70..=84 => Self::Hire,
            50..=69 => Self::Neutral,
            _ => Self::NoHire,
        }
    }
}

/// One question asked by the agent and the candidate's reply, when there was one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl QuestionAnswer {
    pub fn unanswered(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
        }
    }
}

/// Scores and narrative produced for a finished call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub technical_score: u8,
    pub communication_score: u8,
    pub confidence_score: u8,
    pub overall_score: u8,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: Recommendation,
    pub summary: String,
}

pub const NEUTRAL_SCORE: u8 = 50;
pub const MANUAL_REVIEW_FLAG: &str = "automated analysis unavailable, manual review required";

impl CallAnalysis {
    /// Result used whenever transcript analysis cannot be trusted or did not run.
    pub fn neutral_fallback() -> Self {
        Self {
            technical_score: NEUTRAL_SCORE,
            communication_score: NEUTRAL_SCORE,
            confidence_score: NEUTRAL_SCORE,
            overall_score: NEUTRAL_SCORE,
            strengths: vec!["participated".to_string()],
            weaknesses: vec![MANUAL_REVIEW_FLAG.to_string()],
            recommendation: Recommendation::Neutral,
            summary: "The interview finished but could not be analyzed automatically.".to_string(),
        }
    }

    pub fn requires_manual_review(&self) -> bool {
        self.weaknesses.iter().any(|entry| entry == MANUAL_REVIEW_FLAG)
    }
}

/// What caused an interview to reach `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTrigger {
    Webhook,
    Poll,
    StalenessTier,
    HardCeiling,
    SweepRecovered,
    SweepForced,
}

impl CompletionTrigger {
    /// Whether the completion was synthesized without an authoritative call-finished signal.
    pub const fn is_synthetic(self) -> bool {
        matches!(
            self,
            CompletionTrigger::StalenessTier
                | CompletionTrigger::HardCeiling
                | CompletionTrigger::SweepForced
        )
    }
}

/// Where the analysis block of a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Analyzer,
    AnalyzerFallback,
    ProviderScores,
    Placeholder,
}

/// Persisted outcome of a completed interview. Only the completion routine writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewResult {
    pub duration_secs: u32,
    pub transcript: String,
    pub questions: Vec<QuestionAnswer>,
    pub analysis: CallAnalysis,
    pub analysis_source: AnalysisSource,
    pub trigger: CompletionTrigger,
}

/// External "application accepted" signal that creates an interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationAccepted {
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub recruiter_id: RecruiterId,
    pub job_context: JobContext,
    #[serde(default)]
    pub cv_summary: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
}

/// The interview aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interview {
    pub id: InterviewId,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub recruiter_id: RecruiterId,
    pub status: InterviewStatus,
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub agent_id: Option<AgentId>,
    pub call_id: Option<CallId>,
    pub job_context: JobContext,
    pub cv_summary: Option<String>,
    pub candidate_name: Option<String>,
    pub result: Option<InterviewResult>,
}

impl Interview {
    /// Build a freshly scheduled interview. `validity` must be positive.
    pub fn schedule(
        accepted: ApplicationAccepted,
        scheduled_at: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        let validity = if validity > Duration::zero() {
            validity
        } else {
            Duration::hours(1)
        };

        Self {
            id: InterviewId::generate(),
            job_id: accepted.job_id,
            candidate_id: accepted.candidate_id,
            recruiter_id: accepted.recruiter_id,
            status: InterviewStatus::Scheduled,
            scheduled_at,
            expires_at: scheduled_at + validity,
            started_at: None,
            completed_at: None,
            attempt_count: 0,
            agent_id: None,
            call_id: None,
            job_context: accepted.job_context,
            cv_summary: accepted
                .cv_summary
                .map(|summary| summary.trim().to_string())
                .filter(|summary| !summary.is_empty()),
            candidate_name: accepted.candidate_name,
            result: None,
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time spent in flight. Falls back to the scheduling time when `started_at` was never set.
    pub fn elapsed_in_flight(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at.unwrap_or(self.scheduled_at)
    }

    pub fn candidate_label(&self) -> String {
        self.candidate_name
            .clone()
            .unwrap_or_else(|| format!("candidate {}", self.candidate_id.0))
    }

    pub fn view(&self) -> InterviewView {
        let analysis = self.result.as_ref().map(|result| &result.analysis);
        InterviewView {
            interview_id: self.id.clone(),
            status: self.status.label(),
            job_id: self.job_id.clone(),
            candidate_id: self.candidate_id.clone(),
            scheduled_at: self.scheduled_at,
            expires_at: self.expires_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            attempt_count: self.attempt_count,
            overall_score: analysis.map(|analysis| analysis.overall_score),
            recommendation: analysis.map(|analysis| analysis.recommendation.label()),
            result: self.result.clone(),
        }
    }
}

/// Serialized representation of an interview for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewView {
    pub interview_id: InterviewId,
    pub status: &'static str,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<InterviewResult>,
}
