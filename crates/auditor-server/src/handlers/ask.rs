use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use common::{AskResponse, QuestionRequest};

use crate::{
    handlers::auth::is_authorized,
    handlers::retrieve::{configuration_error, error_response, unauthorized},
    services::generation::{AnswerError, answer},
    state::AppState,
};

pub async fn ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QuestionRequest>,
) -> Response {
    if !is_authorized(&headers, &state) {
        return unauthorized();
    }
    metrics::counter!("auditor_requests_total", "route" => "ask").increment(1);

    let strategy = req.strategy.unwrap_or_default();
    match answer(
        &state.orchestrator,
        state.generator.as_deref(),
        &req.question,
        &strategy,
    )
    .await
    {
        Ok(answer) => Json(AskResponse {
            answer: answer.text,
            records: answer.records,
            generated: answer.generated,
        })
        .into_response(),
        Err(AnswerError::Configuration(err)) => configuration_error(&err),
        Err(err @ AnswerError::Generation(_)) => {
            tracing::warn!(error = %err, "answer generation failed");
            error_response(StatusCode::BAD_GATEWAY, &err.to_string())
        }
    }
}
