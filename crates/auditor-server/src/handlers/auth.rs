use axum::http::HeaderMap;

use crate::state::AppState;

pub const X_API_TOKEN: &str = "x-api-token";

pub fn is_authorized(headers: &HeaderMap, state: &AppState) -> bool {
    state.api_token.as_deref().is_none_or(|expected| {
        headers
            .get(X_API_TOKEN)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|token| token == expected)
    })
}
