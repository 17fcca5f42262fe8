use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Tags the request (and every log line it produces) with a correlation id,
/// reusing the caller's id when one is supplied.
pub async fn trace_with_correlation(mut req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let correlation = req
        .headers()
        .get(X_CORRELATION_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);
    let header = HeaderValue::from_str(&correlation).ok();
    if let Some(value) = header.clone() {
        req.headers_mut().insert(X_CORRELATION_ID, value);
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = info_span!("request", correlation_id = %correlation);
    let mut res = next.run(req).instrument(span).await;

    if let Some(value) = header {
        res.headers_mut().insert(X_CORRELATION_ID, value);
    }
    info!(
        correlation_id = %correlation,
        method = %method,
        path = %path,
        status = res.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "request_complete"
    );
    res
}
