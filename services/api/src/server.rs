use crate::cli::ServeArgs;
use crate::infra::{build_service, in_memory_store, AppState, Collaborators, ServiceSettings};
use crate::routes::with_interview_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use screencall::config::AppConfig;
use screencall::error::AppError;
use screencall::telemetry;
use screencall::workflows::interviews::ReconciliationScheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    if config.interviews.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET is not set; call-completed webhooks are unauthenticated");
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = build_service(
        ServiceSettings::from_config(&config),
        in_memory_store(),
        Collaborators::from_config(&config)?,
    );

    let scheduler = if args.no_scheduler {
        None
    } else {
        Some(ReconciliationScheduler::start(
            service.engine(),
            config.reconciliation.poll_interval,
            config.reconciliation.sweep_interval,
        )?)
    };

    let app = with_interview_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "interview service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    if let Some(scheduler) = scheduler {
        scheduler.stop().await?;
    }
    info!("interview service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
