//! Interview state machine.
//!
//! Every status change in the crate goes through [`next_status`], and every persisted change is
//! applied through [`apply_change`] so the in-memory store and any durable store share one
//! transition table:
//!
//! ```text
//! scheduled ──start──▶ in_progress ──call finished / staleness──▶ completed
//!     │                    │
//!     │ expiry reached     └──expiry ceiling──▶ expired
//!     ▼
//!  expired          scheduled | in_progress ──operator cancel──▶ cancelled
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use super::domain::{CallId, CompletionTrigger, Interview, InterviewResult, InterviewStatus};

/// Events that may move an interview between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewEvent {
    StartRequested,
    ExpiryReached,
    CallFinished,
    StalenessExceeded,
    ExpiryCeilingExceeded,
    OperatorCancel,
}

impl fmt::Display for InterviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterviewEvent::StartRequested => "start requested",
            InterviewEvent::ExpiryReached => "expiry reached",
            InterviewEvent::CallFinished => "call finished",
            InterviewEvent::StalenessExceeded => "staleness exceeded",
            InterviewEvent::ExpiryCeilingExceeded => "expiry ceiling exceeded",
            InterviewEvent::OperatorCancel => "operator cancel",
        };
        f.write_str(label)
    }
}

impl From<CompletionTrigger> for InterviewEvent {
    fn from(trigger: CompletionTrigger) -> Self {
        if trigger.is_synthetic() {
            InterviewEvent::StalenessExceeded
        } else {
            InterviewEvent::CallFinished
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply '{event}' to an interview that is {from}")]
pub struct TransitionRejected {
    pub from: InterviewStatus,
    pub event: InterviewEvent,
}

/// Pure transition table. Terminal statuses reject every event.
pub fn next_status(
    from: InterviewStatus,
    event: InterviewEvent,
) -> Result<InterviewStatus, TransitionRejected> {
    use InterviewEvent as E;
    use InterviewStatus as S;

    let to = match (from, event) {
        (S::Scheduled, E::StartRequested) => S::InProgress,
        (S::Scheduled, E::ExpiryReached) => S::Expired,
        (S::InProgress, E::CallFinished | E::StalenessExceeded) => S::Completed,
        (S::InProgress, E::ExpiryCeilingExceeded) => S::Expired,
        (S::Scheduled | S::InProgress, E::OperatorCancel) => S::Cancelled,
        _ => return Err(TransitionRejected { from, event }),
    };

    Ok(to)
}

/// A conditional mutation of an interview, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Start {
        call_id: CallId,
        started_at: DateTime<Utc>,
    },
    Complete {
        result: Box<InterviewResult>,
        completed_at: DateTime<Utc>,
    },
    Expire {
        at: DateTime<Utc>,
        from: InterviewStatus,
    },
    Cancel {
        at: DateTime<Utc>,
    },
}

impl StatusChange {
    pub fn event(&self) -> InterviewEvent {
        match self {
            StatusChange::Start { .. } => InterviewEvent::StartRequested,
            StatusChange::Complete { result, .. } => InterviewEvent::from(result.trigger),
            StatusChange::Expire {
                from: InterviewStatus::InProgress,
                ..
            } => InterviewEvent::ExpiryCeilingExceeded,
            StatusChange::Expire { .. } => InterviewEvent::ExpiryReached,
            StatusChange::Cancel { .. } => InterviewEvent::OperatorCancel,
        }
    }
}

/// Apply `change` to `interview` in place, or leave it untouched when the transition is not
/// allowed from its current status. `Expire` additionally requires the caller's view of the
/// status to still be current, so a scheduled-expiry never fires on a started interview.
pub fn apply_change(
    interview: &mut Interview,
    change: StatusChange,
) -> Result<(), TransitionRejected> {
    let event = change.event();
    if let StatusChange::Expire { from, .. } = &change {
        if *from != interview.status {
            return Err(TransitionRejected {
                from: interview.status,
                event,
            });
        }
    }

    let to = next_status(interview.status, event)?;

    match change {
        StatusChange::Start {
            call_id,
            started_at,
        } => {
            interview.call_id = Some(call_id);
            interview.started_at = Some(started_at);
            interview.attempt_count += 1;
        }
        StatusChange::Complete {
            result,
            completed_at,
        } => {
            interview.result = Some(*result);
            interview.completed_at = Some(completed_at);
        }
        StatusChange::Expire { at, .. } | StatusChange::Cancel { at } => {
            interview.completed_at = Some(at);
        }
    }
    interview.status = to;

    Ok(())
}
