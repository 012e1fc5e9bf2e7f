//! Ingress normalization. Webhook bodies and polled analytics arrive in several shapes; they are
//! reduced here to one [`CallOutcome`] before anything touches interview state.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::workflows::interviews::domain::{CompletionTrigger, QuestionAnswer, Recommendation};
use crate::workflows::interviews::provider::{
    CallStatusReport, FlexList, FlexNumber, ProviderReport,
};

/// Body of the provider's call-completed webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct CallWebhook {
    #[serde(alias = "callId")]
    pub call_id: String,
    #[serde(flatten)]
    pub report: ProviderReport,
}

/// Scores and notes the provider attached to the call, already clamped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderAssessment {
    pub technical_score: Option<u8>,
    pub communication_score: Option<u8>,
    pub confidence_score: Option<u8>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: Option<Recommendation>,
    pub summary: Option<String>,
}

impl ProviderAssessment {
    fn from_report(report: &ProviderReport) -> Self {
        let score = |value: &Option<FlexNumber>| value.as_ref().and_then(FlexNumber::as_score);
        Self {
            technical_score: score(&report.technical_score),
            communication_score: score(&report.communication_score),
            confidence_score: score(&report.confidence_score),
            strengths: report
                .strengths
                .clone()
                .map(FlexList::into_items)
                .unwrap_or_default(),
            weaknesses: report
                .weaknesses
                .clone()
                .map(FlexList::into_items)
                .unwrap_or_default(),
            recommendation: report
                .recommendation
                .as_deref()
                .and_then(Recommendation::parse),
            summary: non_empty(report.summary.as_deref()),
        }
    }

    pub fn scores(&self) -> [Option<u8>; 3] {
        [
            self.technical_score,
            self.communication_score,
            self.confidence_score,
        ]
    }
}

/// Everything the completion routine needs to know about a finished (or abandoned) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub trigger: CompletionTrigger,
    pub transcript: Option<String>,
    pub duration_secs: Option<u32>,
    pub provider: ProviderAssessment,
    pub questions: Vec<QuestionAnswer>,
    /// Summary used when the outcome carries no data at all.
    pub note: Option<String>,
}

impl CallOutcome {
    /// Outcome with no call data, used by the synthetic completion tiers.
    pub fn placeholder(trigger: CompletionTrigger, note: impl Into<String>) -> Self {
        Self {
            trigger,
            transcript: None,
            duration_secs: None,
            provider: ProviderAssessment::default(),
            questions: Vec::new(),
            note: Some(note.into()),
        }
    }

    /// Outcome built from a webhook body or an analytics response.
    pub fn from_report(trigger: CompletionTrigger, report: &ProviderReport) -> Self {
        Self {
            trigger,
            transcript: non_empty(report.transcript.as_deref()),
            duration_secs: report.duration.as_ref().and_then(FlexNumber::as_seconds),
            provider: ProviderAssessment::from_report(report),
            questions: report
                .questions
                .as_ref()
                .map(normalize_questions)
                .unwrap_or_default(),
            note: None,
        }
    }

    /// Outcome assembled from a polled status plus optional analytics. Analytics win where both
    /// carry the same field.
    pub fn from_status(
        trigger: CompletionTrigger,
        status: CallStatusReport,
        analytics: Option<&ProviderReport>,
    ) -> Self {
        let mut outcome = analytics
            .map(|report| Self::from_report(trigger, report))
            .unwrap_or_else(|| Self {
                trigger,
                transcript: None,
                duration_secs: None,
                provider: ProviderAssessment::default(),
                questions: Vec::new(),
                note: None,
            });

        if outcome.transcript.is_none() {
            outcome.transcript = non_empty(status.transcript.as_deref());
        }
        if outcome.duration_secs.is_none() {
            outcome.duration_secs = status.duration_secs;
        }
        outcome
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn list_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\d{1,3}\s*[.):]|[-*•]|[Qq]\d{1,3}\s*[.):])\s*")
            .expect("list marker pattern is valid")
    })
}

fn clean_item(raw: &str) -> Option<String> {
    let stripped = list_marker().replace(raw.trim(), "");
    non_empty(Some(stripped.as_ref()))
}

fn question_from_object(fields: &serde_json::Map<String, Value>) -> Option<QuestionAnswer> {
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
    };
    let question = text(&["question", "q", "text", "prompt"]).and_then(clean_item)?;
    Some(QuestionAnswer {
        question,
        answer: non_empty(text(&["answer", "a", "response", "reply"])),
    })
}

/// Reduce the provider's question list to canonical pairs.
///
/// Accepts a JSON array of strings or `{question, answer}` objects, the same array encoded as a
/// JSON string, an object wrapping a `questions` array, or plain text with one question per line.
pub fn normalize_questions(value: &Value) -> Vec<QuestionAnswer> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => clean_item(text).map(QuestionAnswer::unanswered),
                Value::Object(fields) => question_from_object(fields),
                _ => None,
            })
            .collect(),
        Value::Object(fields) => match fields.get("questions") {
            Some(inner) => normalize_questions(inner),
            None => question_from_object(fields).into_iter().collect(),
        },
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                if let Ok(decoded) = serde_json::from_str::<Value>(trimmed) {
                    return normalize_questions(&decoded);
                }
            }
            trimmed
                .split(['\n', '|'])
                .filter_map(clean_item)
                .map(QuestionAnswer::unanswered)
                .collect()
        }
        _ => Vec::new(),
    }
}
