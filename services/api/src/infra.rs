use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use screencall::config::AppConfig;
use screencall::error::AppError;
use screencall::workflows::interviews::{
    CallGateway, CompletionService, DispatchOrchestrator, DispatchSettings, HttpCallGateway,
    HttpTranscriptAnalyzer, InMemoryInterviewStore, InterviewService, InterviewStore,
    LoggingNotifier, PipelineNotifier, ReconcilePolicy, ReconciliationEngine, TranscriptAnalyzer,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// External collaborators of the interview service.
pub(crate) struct Collaborators {
    pub(crate) gateway: Arc<dyn CallGateway>,
    pub(crate) analyzer: Arc<dyn TranscriptAnalyzer>,
    pub(crate) notifier: Arc<dyn PipelineNotifier>,
}

impl Collaborators {
    /// HTTP clients for the configured call provider and analyzer, with log-only notifications.
    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            gateway: Arc::new(HttpCallGateway::new(&config.provider)?),
            analyzer: Arc::new(HttpTranscriptAnalyzer::new(&config.analyzer)?),
            notifier: Arc::new(LoggingNotifier),
        })
    }
}

/// Tunables applied when wiring the service.
#[derive(Debug, Clone)]
pub(crate) struct ServiceSettings {
    pub(crate) dispatch: DispatchSettings,
    pub(crate) policy: ReconcilePolicy,
    pub(crate) analyzer_timeout: Duration,
    pub(crate) webhook_secret: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            policy: ReconcilePolicy::default(),
            analyzer_timeout: Duration::from_secs(30),
            webhook_secret: None,
        }
    }
}

impl ServiceSettings {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            dispatch: DispatchSettings::from_config(&config.interviews),
            policy: ReconcilePolicy::from_config(
                &config.reconciliation,
                config.provider.request_timeout,
            ),
            analyzer_timeout: config.analyzer.request_timeout,
            webhook_secret: config.interviews.webhook_secret.clone(),
        }
    }
}

/// Wire store, dispatch and reconciliation into one service.
pub(crate) fn build_service<S>(
    settings: ServiceSettings,
    store: Arc<S>,
    collaborators: Collaborators,
) -> Arc<InterviewService<S>>
where
    S: InterviewStore + 'static,
{
    let Collaborators {
        gateway,
        analyzer,
        notifier,
    } = collaborators;

    let dispatch = DispatchOrchestrator::new(
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        settings.dispatch,
    );
    let completion =
        CompletionService::new(store.clone(), analyzer, notifier, settings.analyzer_timeout);
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        gateway,
        completion,
        settings.policy,
    ));

    Arc::new(InterviewService::new(
        store,
        dispatch,
        engine,
        settings.webhook_secret,
    ))
}

pub(crate) fn in_memory_store() -> Arc<InMemoryInterviewStore> {
    Arc::new(InMemoryInterviewStore::new())
}
