use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use genmedia_core::types::Caller;

use crate::auth;
use crate::state::AppState;

/// Extractor that resolves the caller from a Bearer header or `?token=`.
pub struct Authenticated(pub Caller);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string());

        let query = parts.uri.query().unwrap_or("");
        let query_token = auth::extract_token_from_query(query).map(|s| s.to_string());

        let result = auth::validate_auth(&state.config, bearer.as_deref(), query_token.as_deref());

        async move {
            match result {
                Some(caller) => Ok(Authenticated(caller)),
                None => Err(StatusCode::UNAUTHORIZED),
            }
        }
    }
}
