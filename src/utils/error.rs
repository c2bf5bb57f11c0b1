use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from the HTTP client
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Backend answered with a non-success status
    #[error("Backend returned status {status} for {endpoint}")]
    BackendStatusError { status: u16, endpoint: String },

    /// Request was aborted because a newer one superseded it
    #[error("Request cancelled")]
    CancelledError,

    /// Error from the durable preference store
    #[error("Preference error: {0}")]
    PreferenceError(String),

    /// Error from export operations
    #[error("Export error: {0}")]
    ExportError(String),

    /// Operator supplied something we cannot use
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
}

impl AppError {
    /// Aborts are a normal outcome of superseding a request, not a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::CancelledError)
    }
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancelled_counts_as_cancellation() {
        assert!(AppError::CancelledError.is_cancellation());
        assert!(!AppError::ExportError("disk full".to_string()).is_cancellation());

        let status = AppError::BackendStatusError { status: 502, endpoint: "/api/logs".to_string() };
        assert!(!status.is_cancellation());
        assert_eq!(status.to_string(), "Backend returned status 502 for /api/logs");
    }
}
