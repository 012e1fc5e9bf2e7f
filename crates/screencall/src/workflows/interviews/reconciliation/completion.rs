use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::payload::CallOutcome;
use crate::workflows::interviews::analysis::{
    analyze_or_fallback, average_score, extract_from_transcript, AnalysisRequest,
    TranscriptAnalyzer,
};
use crate::workflows::interviews::domain::{
    AnalysisSource, CallAnalysis, Interview, InterviewId, InterviewResult, InterviewStatus,
    Recommendation,
};
use crate::workflows::interviews::error::InterviewError;
use crate::workflows::interviews::lifecycle::StatusChange;
use crate::workflows::interviews::notify::{publish_terminal, PipelineNotifier};
use crate::workflows::interviews::store::{ChangeOutcome, InterviewStore};

/// What a call to [`CompletionService::complete`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Completed(Interview),
    /// Another path got there first, or the interview was cancelled/expired. Nothing was written.
    AlreadyTerminal(Interview),
}

impl Completion {
    pub fn interview(&self) -> &Interview {
        match self {
            Completion::Completed(interview) | Completion::AlreadyTerminal(interview) => interview,
        }
    }
}

/// The single write path for interview results. Webhook, poll and sweep all end here.
pub struct CompletionService<S> {
    store: Arc<S>,
    analyzer: Arc<dyn TranscriptAnalyzer>,
    notifier: Arc<dyn PipelineNotifier>,
    analyzer_timeout: Duration,
}

impl<S> CompletionService<S>
where
    S: InterviewStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        analyzer: Arc<dyn TranscriptAnalyzer>,
        notifier: Arc<dyn PipelineNotifier>,
        analyzer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            analyzer,
            notifier,
            analyzer_timeout,
        }
    }

    /// Complete an in-progress interview with `outcome`. Idempotent: a terminal interview is
    /// returned untouched and the analyzer is not consulted.
    pub async fn complete(
        &self,
        id: &InterviewId,
        outcome: CallOutcome,
        now: DateTime<Utc>,
    ) -> Result<Completion, InterviewError> {
        let interview = self
            .store
            .fetch(id)?
            .ok_or_else(|| InterviewError::interview_not_found(id))?;

        if interview.status.is_terminal() {
            tracing::debug!(
                interview_id = %id,
                status = %interview.status,
                trigger = ?outcome.trigger,
                "completion ignored for terminal interview"
            );
            return Ok(Completion::AlreadyTerminal(interview));
        }
        if interview.status != InterviewStatus::InProgress {
            return Err(InterviewError::conflict(id, interview.status));
        }

        let result = self.build_result(&interview, outcome).await;
        let trigger = result.trigger;
        let change = StatusChange::Complete {
            result: Box::new(result),
            completed_at: now,
        };

        match self.store.apply(id, change)? {
            ChangeOutcome::Applied(updated) => {
                tracing::info!(
                    interview_id = %id,
                    trigger = ?trigger,
                    overall_score = updated.result.as_ref().map(|r| r.analysis.overall_score),
                    "interview completed"
                );
                publish_terminal(self.notifier.as_ref(), &updated);
                Ok(Completion::Completed(updated))
            }
            ChangeOutcome::Rejected { current, reason } if current.status.is_terminal() => {
                tracing::debug!(interview_id = %id, %reason, "lost completion race");
                Ok(Completion::AlreadyTerminal(current))
            }
            ChangeOutcome::Rejected { current, .. } => {
                Err(InterviewError::conflict(id, current.status))
            }
        }
    }

    /// Move `interview` to `expired` if it is still in the status the caller observed.
    /// Returns `None` when another transition won.
    pub fn expire(
        &self,
        interview: &Interview,
        now: DateTime<Utc>,
    ) -> Result<Option<Interview>, InterviewError> {
        let change = StatusChange::Expire {
            at: now,
            from: interview.status,
        };
        match self.store.apply(&interview.id, change)? {
            ChangeOutcome::Applied(updated) => {
                tracing::info!(
                    interview_id = %updated.id,
                    previous = %interview.status,
                    "interview expired"
                );
                publish_terminal(self.notifier.as_ref(), &updated);
                Ok(Some(updated))
            }
            ChangeOutcome::Rejected { current, .. } => {
                tracing::debug!(
                    interview_id = %current.id,
                    status = %current.status,
                    "expiry skipped"
                );
                Ok(None)
            }
        }
    }

    async fn build_result(&self, interview: &Interview, outcome: CallOutcome) -> InterviewResult {
        let CallOutcome {
            trigger,
            transcript,
            duration_secs,
            provider,
            mut questions,
            note,
        } = outcome;

        let transcript = transcript.unwrap_or_default();
        if questions.is_empty() && !transcript.is_empty() {
            questions = extract_from_transcript(&transcript);
        }

        let (analysis, analysis_source) = if !transcript.is_empty() {
            let request = AnalysisRequest {
                transcript: transcript.clone(),
                job: interview.job_context.clone(),
                candidate_label: interview.candidate_label(),
            };
            analyze_or_fallback(self.analyzer.as_ref(), &request, self.analyzer_timeout).await
        } else if let Some(overall_score) = average_score(&provider.scores()) {
            let analysis = CallAnalysis {
                technical_score: provider.technical_score.unwrap_or(overall_score),
                communication_score: provider.communication_score.unwrap_or(overall_score),
                confidence_score: provider.confidence_score.unwrap_or(overall_score),
                overall_score,
                strengths: provider.strengths,
                weaknesses: provider.weaknesses,
                recommendation: provider
                    .recommendation
                    .unwrap_or_else(|| Recommendation::from_overall_score(overall_score)),
                summary: provider.summary.unwrap_or_else(|| {
                    "Scores supplied by the call provider; no transcript was available."
                        .to_string()
                }),
            };
            (analysis, AnalysisSource::ProviderScores)
        } else {
            let mut analysis = CallAnalysis::neutral_fallback();
            let source = match note {
                Some(note) => {
                    analysis.summary = note;
                    AnalysisSource::Placeholder
                }
                None => AnalysisSource::AnalyzerFallback,
            };
            (analysis, source)
        };

        InterviewResult {
            duration_secs: duration_secs.unwrap_or(0),
            transcript,
            questions,
            analysis,
            analysis_source,
            trigger,
        }
    }
}
