use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateId, Interview, InterviewId, InterviewStatus, JobId, Recommendation,
};

/// Stage the application subsystem should move the applicant to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Interviewed,
    Rejected,
    InterviewExpired,
    InterviewCancelled,
}

/// Payload handed to the application subsystem after a terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineUpdate {
    pub interview_id: InterviewId,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
}

impl PipelineUpdate {
    /// Derive the update for a terminal interview; `None` while the interview is still live.
    pub fn for_interview(interview: &Interview) -> Option<Self> {
        let analysis = interview.result.as_ref().map(|result| &result.analysis);
        let stage = match interview.status {
            InterviewStatus::Completed => match analysis.map(|analysis| analysis.recommendation) {
                Some(Recommendation::NoHire) => PipelineStage::Rejected,
                _ => PipelineStage::Interviewed,
            },
            InterviewStatus::Expired => PipelineStage::InterviewExpired,
            InterviewStatus::Cancelled => PipelineStage::InterviewCancelled,
            InterviewStatus::Scheduled | InterviewStatus::InProgress => return None,
        };

        Some(Self {
            interview_id: interview.id.clone(),
            job_id: interview.job_id.clone(),
            candidate_id: interview.candidate_id.clone(),
            stage,
            recommendation: analysis.map(|analysis| analysis.recommendation),
            overall_score: analysis.map(|analysis| analysis.overall_score),
        })
    }
}

/// Outbound hook towards the application pipeline (status board, ATS adapter, e-mail).
pub trait PipelineNotifier: Send + Sync {
    fn publish(&self, update: PipelineUpdate) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("pipeline transport unavailable: {0}")]
    Transport(String),
}

/// Notifier that only records the update in the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl PipelineNotifier for LoggingNotifier {
    fn publish(&self, update: PipelineUpdate) -> Result<(), NotifyError> {
        tracing::info!(
            interview_id = %update.interview_id,
            stage = ?update.stage,
            recommendation = ?update.recommendation,
            "pipeline update"
        );
        Ok(())
    }
}

/// Publish the update for `interview`, logging rather than propagating transport failures.
pub(crate) fn publish_terminal(notifier: &dyn PipelineNotifier, interview: &Interview) {
    let Some(update) = PipelineUpdate::for_interview(interview) else {
        return;
    };
    if let Err(err) = notifier.publish(update) {
        tracing::warn!(interview_id = %interview.id, error = %err, "pipeline notification failed");
    }
}
