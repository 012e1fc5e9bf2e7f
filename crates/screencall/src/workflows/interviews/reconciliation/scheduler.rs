use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::ReconciliationEngine;
use crate::workflows::interviews::store::InterviewStore;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("{task} interval must be greater than zero")]
    InvalidInterval { task: &'static str },
    #[error("{task} task failed: {source}")]
    Join {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Owns the periodic poll and staleness sweep. Both run until [`stop`](Self::stop) is called.
pub struct ReconciliationScheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ReconciliationScheduler {
    pub fn start<S>(
        engine: Arc<ReconciliationEngine<S>>,
        poll_every: Duration,
        sweep_every: Duration,
    ) -> Result<Self, SchedulerError>
    where
        S: InterviewStore + 'static,
    {
        if poll_every.is_zero() {
            return Err(SchedulerError::InvalidInterval { task: "poll" });
        }
        if sweep_every.is_zero() {
            return Err(SchedulerError::InvalidInterval { task: "sweep" });
        }

        let (shutdown, signal) = watch::channel(false);

        let poll_engine = engine.clone();
        let poll = spawn_periodic("poll", poll_every, signal.clone(), move || {
            let engine = poll_engine.clone();
            async move {
                if let Err(err) = engine.poll_once(Utc::now()).await {
                    tracing::error!(error = %err, "reconciliation poll failed");
                }
            }
        });

        let sweep = spawn_periodic("sweep", sweep_every, signal, move || {
            let engine = engine.clone();
            async move {
                if let Err(err) = engine.sweep_stale(Utc::now()).await {
                    tracing::error!(error = %err, "staleness sweep failed");
                }
            }
        });

        tracing::info!(
            poll_secs = poll_every.as_secs(),
            sweep_secs = sweep_every.as_secs(),
            "reconciliation scheduler started"
        );

        Ok(Self {
            shutdown,
            tasks: vec![("poll", poll), ("sweep", sweep)],
        })
    }

    /// Signal both tasks and wait for the in-flight cycle, if any, to finish.
    pub async fn stop(self) -> Result<(), SchedulerError> {
        let _ = self.shutdown.send(true);
        for (task, handle) in self.tasks {
            handle
                .await
                .map_err(|source| SchedulerError::Join { task, source })?;
        }
        tracing::info!("reconciliation scheduler stopped");
        Ok(())
    }
}

fn spawn_periodic<F, Fut>(
    task: &'static str,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(task, "periodic task shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::interviews::analysis::{AnalysisRequest, AnalyzerError, TranscriptAnalyzer};
    use crate::workflows::interviews::domain::{AgentId, CallAnalysis, CallId};
    use crate::workflows::interviews::notify::LoggingNotifier;
    use crate::workflows::interviews::provider::{
        AgentInstructions, CallContext, CallGateway, CallStatusReport, GatewayError,
        ProviderReport,
    };
    use crate::workflows::interviews::reconciliation::{CompletionService, ReconcilePolicy};
    use crate::workflows::interviews::store::InMemoryInterviewStore;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl CallGateway for Silent {
        async fn create_agent(&self, _: &AgentInstructions) -> Result<AgentId, GatewayError> {
            Err(GatewayError::Timeout)
        }

        async fn dispatch_call(
            &self,
            _: &AgentId,
            _: &str,
            _: &CallContext,
        ) -> Result<CallId, GatewayError> {
            Err(GatewayError::Timeout)
        }

        async fn call_status(&self, _: &CallId) -> Result<CallStatusReport, GatewayError> {
            Err(GatewayError::Timeout)
        }

        async fn call_analytics(&self, _: &CallId) -> Result<ProviderReport, GatewayError> {
            Err(GatewayError::Timeout)
        }
    }

    #[async_trait]
    impl TranscriptAnalyzer for Silent {
        async fn analyze(&self, _: &AnalysisRequest) -> Result<CallAnalysis, AnalyzerError> {
            Err(AnalyzerError::Timeout)
        }
    }

    fn engine() -> Arc<ReconciliationEngine<InMemoryInterviewStore>> {
        let store = Arc::new(InMemoryInterviewStore::new());
        let completion = CompletionService::new(
            store.clone(),
            Arc::new(Silent),
            Arc::new(LoggingNotifier),
            Duration::from_secs(1),
        );
        Arc::new(ReconciliationEngine::new(
            store,
            Arc::new(Silent),
            completion,
            ReconcilePolicy::default(),
        ))
    }

    #[tokio::test]
    async fn zero_intervals_are_rejected() {
        let err = ReconciliationScheduler::start(engine(), Duration::ZERO, Duration::from_secs(1))
            .err()
            .expect("zero poll interval rejected");
        assert!(matches!(err, SchedulerError::InvalidInterval { task: "poll" }));
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_stop_joins_both_tasks() {
        let scheduler = ReconciliationScheduler::start(
            engine(),
            Duration::from_secs(30),
            Duration::from_secs(7200),
        )
        .expect("scheduler starts");

        tokio::time::sleep(Duration::from_secs(95)).await;
        scheduler.stop().await.expect("scheduler stops cleanly");
    }
}
