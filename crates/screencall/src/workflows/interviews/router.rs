use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationAccepted, CandidateId, InterviewId, RecruiterId};
use super::error::InterviewError;
use super::reconciliation::{CallWebhook, Completion};
use super::service::InterviewService;
use super::store::InterviewStore;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub candidate_id: CandidateId,
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub recruiter_id: RecruiterId,
}

/// Router builder exposing the interview lifecycle, webhook ingress and debug endpoints.
pub fn interview_router<S>(service: Arc<InterviewService<S>>) -> Router
where
    S: InterviewStore + 'static,
{
    Router::new()
        .route("/api/v1/interviews", post(schedule_handler::<S>))
        .route("/api/v1/interviews/:interview_id", get(status_handler::<S>))
        .route(
            "/api/v1/interviews/:interview_id/start",
            post(start_handler::<S>),
        )
        .route(
            "/api/v1/interviews/:interview_id/cancel",
            post(cancel_handler::<S>),
        )
        .route(
            "/api/v1/webhooks/call-completed",
            post(webhook_handler::<S>),
        )
        .route(
            "/api/v1/debug/interviews/in-flight",
            get(in_flight_handler::<S>),
        )
        .route(
            "/api/v1/debug/interviews/:interview_id/reconcile",
            post(reconcile_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn schedule_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    axum::Json(accepted): axum::Json<ApplicationAccepted>,
) -> Response
where
    S: InterviewStore + 'static,
{
    match service.schedule(accepted).await {
        Ok(interview) => (StatusCode::CREATED, axum::Json(interview.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    Path(interview_id): Path<String>,
) -> Response
where
    S: InterviewStore + 'static,
{
    match service.get(&InterviewId(interview_id)) {
        Ok(interview) => (StatusCode::OK, axum::Json(interview.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn start_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    Path(interview_id): Path<String>,
    axum::Json(request): axum::Json<StartRequest>,
) -> Response
where
    S: InterviewStore + 'static,
{
    let id = InterviewId(interview_id);
    match service
        .start(&id, &request.candidate_id, &request.phone_number)
        .await
    {
        Ok(interview) => (StatusCode::OK, axum::Json(interview.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    Path(interview_id): Path<String>,
    axum::Json(request): axum::Json<CancelRequest>,
) -> Response
where
    S: InterviewStore + 'static,
{
    match service.cancel(&InterviewId(interview_id), &request.recruiter_id) {
        Ok(interview) => (StatusCode::OK, axum::Json(interview.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn webhook_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<CallWebhook>,
) -> Response
where
    S: InterviewStore + 'static,
{
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = service.verify_webhook(secret) {
        return error_response(err);
    }

    match service.ingest_webhook(payload).await {
        Ok(completion) => {
            let outcome = match &completion {
                Completion::Completed(_) => "completed",
                Completion::AlreadyTerminal(_) => "already_terminal",
            };
            let interview = completion.interview();
            let payload = json!({
                "interview_id": interview.id,
                "status": interview.status.label(),
                "outcome": outcome,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn in_flight_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
) -> Response
where
    S: InterviewStore + 'static,
{
    match service.in_flight() {
        Ok(interviews) => {
            let payload = json!({
                "count": interviews.len(),
                "interviews": interviews,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reconcile_handler<S>(
    State(service): State<Arc<InterviewService<S>>>,
    Path(interview_id): Path<String>,
) -> Response
where
    S: InterviewStore + 'static,
{
    match service.force_reconcile(&InterviewId(interview_id)).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: InterviewError) -> Response {
    let (status, payload) = match &err {
        InterviewError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": err.to_string() })),
        InterviewError::StateConflict { id, status } => (
            StatusCode::CONFLICT,
            json!({
                "error": err.to_string(),
                "interview_id": id,
                "status": status.label(),
            }),
        ),
        InterviewError::StartPending(id) => (
            StatusCode::CONFLICT,
            json!({ "error": err.to_string(), "interview_id": id }),
        ),
        InterviewError::Unauthorized(_) => {
            (StatusCode::FORBIDDEN, json!({ "error": err.to_string() }))
        }
        InterviewError::InvalidInput(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": err.to_string() }),
        ),
        InterviewError::DependencyFailure { operation, .. } => {
            tracing::warn!(error = %err, "dependency failure surfaced to caller");
            (
                StatusCode::BAD_GATEWAY,
                json!({ "error": err.to_string(), "operation": operation }),
            )
        }
        InterviewError::Store(_) => {
            tracing::error!(error = %err, "interview store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            )
        }
    };
    (status, axum::Json(payload)).into_response()
}
