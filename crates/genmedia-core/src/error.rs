use thiserror::Error;

/// Coarse classification of a failure, used by the retry policy and by the
/// HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    ResourceExhausted,
    InvalidInput,
    PermissionDenied,
    NotFound,
    RemoteUnavailable,
    RetryExhausted,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Only quota-style failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::ResourceExhausted)
    }
}

#[derive(Debug, Error)]
pub enum GenmediaError {
    // Provider errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Remote provider unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<GenmediaError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // Request errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Graph errors
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenmediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenmediaError::RateLimited(_) => ErrorKind::RateLimited,
            GenmediaError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            GenmediaError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            GenmediaError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            GenmediaError::Cancelled => ErrorKind::Cancelled,
            GenmediaError::InvalidInput(_) | GenmediaError::MalformedGraph(_) => {
                ErrorKind::InvalidInput
            }
            GenmediaError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            GenmediaError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The underlying error for diagnostics: unwraps `RetryExhausted` down to
    /// the last failure the provider actually reported.
    pub fn root_cause(&self) -> &GenmediaError {
        match self {
            GenmediaError::RetryExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

/// Classify a failed provider call.
///
/// A structured HTTP status wins when present. Otherwise the message is
/// matched on substrings: `"429"` means rate limited, `"RESOURCE_EXHAUSTED"`
/// means quota exhausted, anything else is a generic provider error.
pub fn classify_provider_error(status: Option<u16>, message: impl Into<String>) -> GenmediaError {
    let message = message.into();
    match status {
        Some(429) => return GenmediaError::RateLimited(message),
        Some(400) => return GenmediaError::InvalidInput(message),
        Some(401) | Some(403) => return GenmediaError::PermissionDenied(message),
        Some(404) => return GenmediaError::NotFound(message),
        Some(s) if (500..600).contains(&s) && !message.contains("RESOURCE_EXHAUSTED") => {
            return GenmediaError::RemoteUnavailable(message);
        }
        _ => {}
    }

    if message.contains("429") {
        GenmediaError::RateLimited(message)
    } else if message.contains("RESOURCE_EXHAUSTED") {
        GenmediaError::ResourceExhausted(message)
    } else {
        GenmediaError::Provider(message)
    }
}

pub type Result<T> = std::result::Result<T, GenmediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_quota_kinds_retry() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ResourceExhausted.is_retryable());
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::PermissionDenied,
            ErrorKind::NotFound,
            ErrorKind::RemoteUnavailable,
            ErrorKind::RetryExhausted,
            ErrorKind::Cancelled,
            ErrorKind::Other,
        ] {
            assert!(!kind.is_retryable(), "{:?} must not retry", kind);
        }
    }

    #[test]
    fn test_classify_by_substring() {
        let e = classify_provider_error(None, "API error: 429 - quota");
        assert_eq!(e.kind(), ErrorKind::RateLimited);

        let e = classify_provider_error(None, "status RESOURCE_EXHAUSTED");
        assert_eq!(e.kind(), ErrorKind::ResourceExhausted);

        let e = classify_provider_error(None, "something broke");
        assert_eq!(e.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(
            classify_provider_error(Some(429), "slow down").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_provider_error(Some(403), "nope").kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_provider_error(Some(400), "bad prompt").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            classify_provider_error(Some(503), "down").kind(),
            ErrorKind::RemoteUnavailable
        );
        // Vertex sometimes reports quota as a 5xx body.
        assert_eq!(
            classify_provider_error(Some(500), "RESOURCE_EXHAUSTED").kind(),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn test_root_cause_unwraps_exhaustion() {
        let err = GenmediaError::RetryExhausted {
            attempts: 5,
            last: Box::new(GenmediaError::RateLimited("429 quota".into())),
        };
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert!(matches!(err.root_cause(), GenmediaError::RateLimited(_)));
        assert!(err.to_string().contains("429 quota"));
    }
}
