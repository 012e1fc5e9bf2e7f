//! Call provider gateway: the narrow seam towards the external voice-call platform.

mod http;

pub use http::HttpCallGateway;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{AgentId, CallId, Interview, JobContext};

/// Instructions used to provision the provider-side agent that conducts the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInstructions {
    pub name: String,
    pub system_prompt: String,
    pub first_message: String,
}

impl AgentInstructions {
    pub fn for_interview(job: &JobContext, cv_summary: Option<&str>) -> Self {
        let mut prompt = format!(
            "You are a friendly recruiter at {company} running a short phone screen for the \
             {title} role. Ask one question at a time, keep the call under ten minutes, and \
             close politely.\n",
            company = job.company,
            title = job.title,
        );

        if !job.description.trim().is_empty() {
            let _ = writeln!(prompt, "\nRole description:\n{}", job.description.trim());
        }

        if !job.requirements.is_empty() {
            prompt.push_str("\nCover these requirements:\n");
            for requirement in &job.requirements {
                let _ = writeln!(prompt, "- {}", requirement.trim());
            }
        }

        match cv_summary {
            Some(summary) if !summary.trim().is_empty() => {
                let _ = writeln!(
                    prompt,
                    "\nCandidate background (from CV):\n{}\nAsk at least one question about it.",
                    summary.trim()
                );
            }
            _ => prompt.push_str("\nNo CV is available; ask the candidate to summarize their background.\n"),
        }

        Self {
            name: format!("{} screen ({})", job.title, job.company),
            system_prompt: prompt,
            first_message: format!(
                "Hi, this is the hiring assistant from {}. Is now a good time for a short \
                 conversation about the {} position?",
                job.company, job.title
            ),
        }
    }
}

/// Variables the agent can reference during the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallContext {
    pub candidate_name: String,
    pub job_title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_summary: Option<String>,
}

impl CallContext {
    pub fn for_interview(interview: &Interview) -> Self {
        Self {
            candidate_name: interview.candidate_label(),
            job_title: interview.job_context.title.clone(),
            company: interview.job_context.company.clone(),
            cv_summary: interview.cv_summary.clone(),
        }
    }

    pub fn variables(&self) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("candidate_name", self.candidate_name.clone());
        vars.insert("job_title", self.job_title.clone());
        vars.insert("company", self.company.clone());
        if let Some(summary) = &self.cv_summary {
            vars.insert("cv_summary", summary.clone());
        }
        vars
    }
}

/// Normalized call state. Vendors use many spellings for the same thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Active,
    Finished,
    Failed,
    Unknown(String),
}

impl CallState {
    pub fn from_provider(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ended" | "completed" | "complete" | "finished" | "done" | "hangup" | "hung_up"
            | "terminated" => Self::Finished,
            "failed" | "error" | "no_answer" | "busy" | "canceled" | "cancelled" => Self::Failed,
            "queued" | "ringing" | "initiated" | "in_progress" | "ongoing" | "active"
            | "forwarding" => Self::Active,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    /// Finished and failed calls will not produce further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Finished | CallState::Failed)
    }
}

/// Snapshot of a call as reported by the provider's status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatusReport {
    pub state: CallState,
    pub raw_status: String,
    pub transcript: Option<String>,
    pub duration_secs: Option<u32>,
}

/// Number that vendors send as an integer, a float, or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexNumber {
    Number(f64),
    Text(String),
}

impl FlexNumber {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            FlexNumber::Number(value) => *value,
            FlexNumber::Text(raw) => raw.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Score clamped to `0..=100`. Values in `0..=1` are read as fractions, `1..=10` as a
    /// ten-point scale.
    pub fn as_score(&self) -> Option<u8> {
        let value = self.as_f64()?;
        if value < 0.0 {
            return Some(0);
        }
        let scaled = if value <= 1.0 && value.fract() != 0.0 {
            value * 100.0
        } else if value <= 10.0 && value.fract() != 0.0 {
            value * 10.0
        } else {
            value
        };
        Some(scaled.round().min(100.0) as u8)
    }

    pub fn as_seconds(&self) -> Option<u32> {
        let value = self.as_f64()?;
        if value < 0.0 {
            return Some(0);
        }
        Some(value.round().min(u32::MAX as f64) as u32)
    }
}

/// List that vendors send either as an array or as one delimited string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexList {
    Items(Vec<String>),
    Text(String),
}

impl FlexList {
    pub fn into_items(self) -> Vec<String> {
        let raw = match self {
            FlexList::Items(items) => items,
            FlexList::Text(text) => text
                .split(['\n', ';', '|'])
                .map(str::to_string)
                .collect(),
        };
        raw.into_iter()
            .map(|item| item.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// Assessment block the provider attaches to a call, whether pushed by webhook or pulled
/// from the analytics endpoint. Every field is optional and loosely typed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderReport {
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default, alias = "duration_seconds", alias = "durationSeconds")]
    pub duration: Option<FlexNumber>,
    #[serde(default, alias = "technicalScore")]
    pub technical_score: Option<FlexNumber>,
    #[serde(default, alias = "communicationScore")]
    pub communication_score: Option<FlexNumber>,
    #[serde(default, alias = "confidenceScore")]
    pub confidence_score: Option<FlexNumber>,
    #[serde(default)]
    pub strengths: Option<FlexList>,
    #[serde(default)]
    pub weaknesses: Option<FlexList>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub questions: Option<serde_json::Value>,
}

#[async_trait]
pub trait CallGateway: Send + Sync {
    async fn create_agent(&self, instructions: &AgentInstructions) -> Result<AgentId, GatewayError>;

    async fn dispatch_call(
        &self,
        agent_id: &AgentId,
        phone_number: &str,
        context: &CallContext,
    ) -> Result<CallId, GatewayError>;

    async fn call_status(&self, call_id: &CallId) -> Result<CallStatusReport, GatewayError>;

    async fn call_analytics(&self, call_id: &CallId) -> Result<ProviderReport, GatewayError>;
}

/// Failures talking to the call provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider has no record of {0}")]
    NotFound(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider request timed out")]
    Timeout,
    #[error("malformed provider response: {0}")]
    Malformed(String),
}
