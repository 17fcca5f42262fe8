use std::sync::Arc;

use async_trait::async_trait;
use auditor_server::services::generation::{AnswerGenerator, NO_RECORDS_MESSAGE};
use auditor_server::services::retrieval::Orchestrator;
use auditor_server::{app, state::AppState};
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::NaiveDate;
use common::{AskResponse, RetrieveResponse, TransactionRecord};
use search_core::{RetrievalDefaults, TantivyLedgerIndex};
use serde_json::{Value, json};
use tower::ServiceExt;

struct EchoGenerator;

struct SilentGenerator;

#[async_trait]
impl AnswerGenerator for SilentGenerator {
    async fn generate(&self, _: &str, _: &str) -> anyhow::Result<String> {
        panic!("generation must not run when nothing was retrieved");
    }
}

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        assert!(system.contains("impartial citizen auditor"));
        Ok(format!("echo: {}", prompt.lines().nth(1).unwrap_or_default()))
    }
}

fn ledger_state() -> AppState {
    let mut index = TantivyLedgerIndex::new_in_memory().expect("index");
    index
        .add_record(&TransactionRecord::payment(
            "Ana Lima",
            "11111111000111",
            "Posto Sol",
            "fuel",
            320.5,
            NaiveDate::from_ymd_opt(2024, 2, 3).expect("valid date"),
        ))
        .expect("add");
    index.commit().expect("commit");
    let orchestrator = Orchestrator::new(RetrievalDefaults::default()).with_lexical(Arc::new(index));
    AppState::for_tests(orchestrator)
}

async fn post(state: AppState, path: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-api-token", token);
    }
    let res = app::router(state)
        .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
        .await
        .expect("response");
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_retrieval_defaults() {
    let res = app::router(ledger_state())
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-correlation-id"));
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    let json: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(json["top_n"], 15);
}

#[tokio::test]
async fn retrieve_returns_records_context_and_sources() {
    let (status, json) = post(
        ledger_state(),
        "/retrieve",
        json!({"question": "fuel spending", "strategy": {"lexicalBySubject": "ana"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: RetrieveResponse = serde_json::from_value(json).expect("retrieve response");
    assert_eq!(parsed.result.records().len(), 1);
    assert!(parsed.context.starts_with("Transaction 1:\n- Subject: Ana Lima"));
    assert_eq!(parsed.sources[0].strategy, "lexical_by_subject");
    assert!(!parsed.fused);
}

#[tokio::test]
async fn unconfigured_strategy_is_service_unavailable() {
    let (status, json) = post(ledger_state(), "/retrieve", json!({"question": "fuel"}), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().is_some_and(|e| e.contains("semantic")));
}

#[tokio::test]
async fn invalid_strategy_is_bad_request() {
    let (status, _) = post(
        ledger_state(),
        "/retrieve",
        json!({"question": "x", "strategy": {"lexical_by_subject": "   "}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ask_without_matches_returns_fixed_message_without_generation() {
    let (status, json) = post(
        ledger_state().with_generator(Arc::new(SilentGenerator)),
        "/ask",
        json!({"question": "who?", "strategy": {"lexical_by_subject": "nobody"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: AskResponse = serde_json::from_value(json).expect("ask response");
    assert_eq!(parsed.answer, NO_RECORDS_MESSAGE);
    assert!(!parsed.generated);
}

#[tokio::test]
async fn ask_with_matches_calls_the_generator() {
    let state = ledger_state().with_generator(Arc::new(EchoGenerator));
    let (status, json) = post(
        state,
        "/ask",
        json!({"question": "fuel?", "strategy": {"lexical_by_subject": "ana"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let parsed: AskResponse = serde_json::from_value(json).expect("ask response");
    assert!(parsed.generated);
    assert_eq!(parsed.records, 1);
    assert_eq!(parsed.answer, "echo: Transaction 1:");
}

#[tokio::test]
async fn ask_with_matches_but_no_generator_is_unavailable() {
    let (status, _) = post(
        ledger_state(),
        "/ask",
        json!({"question": "fuel?", "strategy": {"lexical_by_subject": "ana"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ask_without_generator_is_unavailable_even_without_matches() {
    let (status, json) = post(
        ledger_state(),
        "/ask",
        json!({"question": "who?", "strategy": {"lexical_by_subject": "nobody"}}),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().is_some_and(|e| e.contains("generation.api_key")));
}

#[tokio::test]
async fn api_token_is_enforced_when_configured() {
    let body = json!({"question": "fuel", "strategy": {"lexical_by_subject": "ana"}});
    let (status, _) = post(
        ledger_state().with_api_token("secret-token"),
        "/retrieve",
        body.clone(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        ledger_state().with_api_token("secret-token"),
        "/retrieve",
        body,
        Some("secret-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
