//! Call reconciliation: webhook ingestion, periodic polling and the staleness sweep, all
//! converging on [`CompletionService::complete`].

mod completion;
mod engine;
mod payload;
mod scheduler;

pub use completion::{Completion, CompletionService};
pub use engine::{
    InFlightView, PollAction, PollReport, ReconcilePolicy, ReconcileReport, ReconciliationEngine,
    SweepReport,
};
pub use payload::{normalize_questions, CallOutcome, CallWebhook, ProviderAssessment};
pub use scheduler::{ReconciliationScheduler, SchedulerError};
