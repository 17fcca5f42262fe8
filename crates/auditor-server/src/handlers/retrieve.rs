use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use common::{ConfigurationError, ErrorResponse, QuestionRequest, RetrieveResponse};
use tracing::warn;

use crate::{handlers::auth::is_authorized, services::context::render_result, state::AppState};

pub async fn retrieve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QuestionRequest>,
) -> Response {
    if !is_authorized(&headers, &state) {
        return unauthorized();
    }
    metrics::counter!("auditor_requests_total", "route" => "retrieve").increment(1);

    let strategy = req.strategy.unwrap_or_default();
    match state
        .orchestrator
        .retrieve_with_report(&req.question, &strategy)
        .await
    {
        Ok(report) => Json(RetrieveResponse {
            context: render_result(&report.result),
            result: report.result,
            sources: report.sources,
            fused: report.fused,
        })
        .into_response(),
        Err(err) => configuration_error(&err),
    }
}

pub fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthorized")
}

/// Bad strategy parameters are the caller's fault; a strategy nobody
/// configured a backend for is the service's.
pub fn configuration_error(err: &ConfigurationError) -> Response {
    warn!(error = %err, "request rejected");
    let status = match err {
        ConfigurationError::InvalidStrategy { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, &err.to_string())
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
