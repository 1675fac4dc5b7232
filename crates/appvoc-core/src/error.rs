use thiserror::Error;

/// Application-wide error types for appvoc.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (DNS, refused, reset, proxy).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A payload did not contain the fields an entity needs.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Illegal job/project state transition.
    #[error("State error: {0}")]
    StateError(String),
}

impl AppError {
    /// Returns true if this error is likely transient (connection trouble
    /// rather than a malformed request).
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::HttpError("connection reset by peer".into()).is_retryable());
        assert!(!AppError::ParseError("missing trackId".into()).is_retryable());
        assert!(!AppError::StateError("job complete".into()).is_retryable());
    }

    #[test]
    fn test_serde_errors_convert() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::SerializationError(_)));
    }
}
