//! Transcript analysis: vendor-backed scoring with a neutral fallback, plus deterministic
//! question extraction.

mod http;
mod questions;

pub use http::HttpTranscriptAnalyzer;
pub use questions::extract_from_transcript;

use std::time::Duration;

use async_trait::async_trait;

use super::domain::{AnalysisSource, CallAnalysis, JobContext};

/// Input handed to the analyzer. Owned so implementations can move it across tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub transcript: String,
    pub job: JobContext,
    pub candidate_label: String,
}

/// External transcript scoring capability. Implementations must not touch interview state.
#[async_trait]
pub trait TranscriptAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analysis timed out")]
    Timeout,
    #[error("analysis quota exhausted")]
    Quota,
    #[error("analyzer error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed analysis: {0}")]
    Malformed(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Run the analyzer under `timeout`, substituting the neutral fallback on any failure.
pub async fn analyze_or_fallback(
    analyzer: &dyn TranscriptAnalyzer,
    request: &AnalysisRequest,
    timeout: Duration,
) -> (CallAnalysis, AnalysisSource) {
    let outcome = match tokio::time::timeout(timeout, analyzer.analyze(request)).await {
        Ok(result) => result,
        Err(_) => Err(AnalyzerError::Timeout),
    };

    match outcome {
        Ok(analysis) => (sanitize(analysis), AnalysisSource::Analyzer),
        Err(err) => {
            tracing::warn!(
                candidate = %request.candidate_label,
                error = %err,
                "transcript analysis failed, using neutral fallback"
            );
            (CallAnalysis::neutral_fallback(), AnalysisSource::AnalyzerFallback)
        }
    }
}

fn sanitize(mut analysis: CallAnalysis) -> CallAnalysis {
    for score in [
        &mut analysis.technical_score,
        &mut analysis.communication_score,
        &mut analysis.confidence_score,
        &mut analysis.overall_score,
    ] {
        *score = (*score).min(100);
    }
    analysis
}

/// Mean of the available scores, rounded. `None` when no score is present.
pub fn average_score(scores: &[Option<u8>]) -> Option<u8> {
    let present: Vec<u32> = scores.iter().flatten().map(|score| u32::from(*score)).collect();
    if present.is_empty() {
        return None;
    }
    let total: u32 = present.iter().sum();
    let count = present.len() as u32;
    Some(((total + count / 2) / count).min(100) as u8)
}
