use std::time::Duration;

use thiserror::Error;

/// Errors returned by calls to the Selas backend.
#[derive(Error, Debug)]
pub enum SelasError {
    /// The backend answered with a non-success HTTP status.
    ///
    /// `message` is the backend's own error message when the body carried
    /// one, otherwise the raw body.
    #[error("Selas returned HTTP {status}: {message}")]
    Backend {
        status: u16,
        message: String,
        hint: Option<String>,
    },

    /// The response was missing expected fields or rows.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or malformed client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SelasError {
    /// The backend-reported message for this error, if it came from the backend.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            SelasError::Backend { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// The backend rejected or failed to process a job request.
///
/// The message is passed through verbatim. Submissions are never retried:
/// the backend may already have debited credits for the job.
#[derive(Error, Debug)]
#[error("Job submission failed: {message}")]
pub struct SubmissionError {
    pub message: String,
    #[source]
    pub source: SelasError,
}

impl From<SelasError> for SubmissionError {
    fn from(source: SelasError) -> Self {
        let message = source
            .backend_message()
            .map(str::to_string)
            .unwrap_or_else(|| source.to_string());
        Self { message, source }
    }
}

/// Errors returned while waiting for a job's results.
#[derive(Error, Debug)]
pub enum AwaitError {
    /// The job does not say how many results to wait for. No fetch was made.
    #[error("Cannot await job results: {0}")]
    Misconfigured(String),

    /// A result fetch failed. Fatal for the await call.
    #[error("Fetching job results failed: {0}")]
    FetchFailed(#[source] SelasError),

    /// The wait budget ran out before enough results arrived.
    #[error("Timed out after {elapsed:?} with {received}/{expected} results")]
    TimedOut {
        expected: usize,
        received: usize,
        elapsed: Duration,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SelasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_error_keeps_backend_message() {
        let err = SubmissionError::from(SelasError::Backend {
            status: 400,
            message: "Not enough credits".into(),
            hint: None,
        });
        assert_eq!(err.message, "Not enough credits");
        assert_eq!(err.to_string(), "Job submission failed: Not enough credits");
    }

    #[test]
    fn test_submission_error_from_non_backend_error() {
        let err = SubmissionError::from(SelasError::InvalidResponse("empty body".into()));
        assert_eq!(err.message, "empty body");
    }

    #[test]
    fn test_timed_out_display() {
        let err = AwaitError::TimedOut {
            expected: 2,
            received: 1,
            elapsed: Duration::from_millis(1000),
        };
        assert_eq!(err.to_string(), "Timed out after 1s with 1/2 results");
    }
}
