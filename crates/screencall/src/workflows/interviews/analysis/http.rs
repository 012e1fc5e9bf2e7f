use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{average_score, AnalysisRequest, AnalyzerError, TranscriptAnalyzer};
use crate::config::AnalyzerConfig;
use crate::workflows::interviews::domain::{CallAnalysis, Recommendation};
use crate::workflows::interviews::provider::{FlexList, FlexNumber};

const RUBRIC: &str = "You evaluate phone screening interviews. Reply with a single JSON object \
with the keys technical_score, communication_score, confidence_score, overall_score (integers \
0-100), strengths and weaknesses (arrays of short strings), recommendation (one of strong_hire, \
hire, neutral, no_hire) and summary (two or three sentences). Judge only what the candidate said.";

/// Chat-completions style client that asks a language model to score a transcript.
pub struct HttpTranscriptAnalyzer {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    technical_score: Option<FlexNumber>,
    communication_score: Option<FlexNumber>,
    confidence_score: Option<FlexNumber>,
    #[serde(default)]
    overall_score: Option<FlexNumber>,
    #[serde(default)]
    strengths: Option<FlexList>,
    #[serde(default)]
    weaknesses: Option<FlexList>,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl HttpTranscriptAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn prompt(request: &AnalysisRequest) -> String {
        let requirements = if request.job.requirements.is_empty() {
            "none listed".to_string()
        } else {
            request.job.requirements.join(", ")
        };
        format!(
            "Role: {title} at {company}\nRequirements: {requirements}\nCandidate: {candidate}\n\n\
             Transcript:\n{transcript}",
            title = request.job.title,
            company = request.job.company,
            candidate = request.candidate_label,
            transcript = request.transcript,
        )
    }
}

/// Turn the model's JSON reply into a bounded analysis. Missing scores make the reply malformed.
fn parse_analysis(content: &str) -> Result<CallAnalysis, AnalyzerError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: RawAnalysis =
        serde_json::from_str(trimmed).map_err(|err| AnalyzerError::Malformed(err.to_string()))?;

    let score = |value: &Option<FlexNumber>, name: &str| {
        value
            .as_ref()
            .and_then(FlexNumber::as_score)
            .ok_or_else(|| AnalyzerError::Malformed(format!("missing {name}")))
    };
    let technical_score = score(&raw.technical_score, "technical_score")?;
    let communication_score = score(&raw.communication_score, "communication_score")?;
    let confidence_score = score(&raw.confidence_score, "confidence_score")?;
    let overall_score = raw
        .overall_score
        .as_ref()
        .and_then(FlexNumber::as_score)
        .or_else(|| {
            average_score(&[
                Some(technical_score),
                Some(communication_score),
                Some(confidence_score),
            ])
        })
        .unwrap_or(technical_score);

    let recommendation = raw
        .recommendation
        .as_deref()
        .and_then(Recommendation::parse)
        .unwrap_or_else(|| Recommendation::from_overall_score(overall_score));

    Ok(CallAnalysis {
        technical_score,
        communication_score,
        confidence_score,
        overall_score,
        strengths: raw.strengths.map(FlexList::into_items).unwrap_or_default(),
        weaknesses: raw.weaknesses.map(FlexList::into_items).unwrap_or_default(),
        recommendation,
        summary: raw.summary.unwrap_or_default().trim().to_string(),
    })
}

#[async_trait]
impl TranscriptAnalyzer for HttpTranscriptAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": RUBRIC },
                { "role": "user", "content": Self::prompt(request) },
            ],
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                AnalyzerError::Timeout
            } else {
                AnalyzerError::Network(err)
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
            return Err(AnalyzerError::Quota);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionBody = response
            .json()
            .await
            .map_err(|err| AnalyzerError::Malformed(err.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalyzerError::Malformed("empty completion".to_string()))?;

        parse_analysis(&content)
    }
}
