use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use genmedia_core::error::{ErrorKind, GenmediaError};

/// Handler error: a core error rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub GenmediaError);

impl From<GenmediaError> for ApiError {
    fn from(e: GenmediaError) -> Self {
        Self(e)
    }
}

/// HTTP status for an error, judged by its root cause.
pub fn status_for(err: &GenmediaError) -> StatusCode {
    match err.root_cause().kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited | ErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = serde_json::json!({ "detail": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GenmediaError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GenmediaError::MalformedGraph("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GenmediaError::PermissionDenied("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&GenmediaError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&GenmediaError::RetryExhausted {
                attempts: 5,
                last: Box::new(GenmediaError::ResourceExhausted("quota".into())),
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&GenmediaError::RemoteUnavailable("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
