use reqwest::StatusCode;
use thiserror::Error;

/// Failure taxonomy for the analysis pipeline.
///
/// The retry policy matches on `RateLimited` only; every other remote
/// failure is terminal. `InvalidInput` and `Configuration` are raised
/// before any network interaction.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("diff input is empty")]
    InvalidInput,

    #[error("missing configuration: {0}")]
    Configuration(String),

    #[error("rate limited by completion service: {0}")]
    RateLimited(String),

    #[error("completion service error: {0}")]
    Service(String),
}

impl AnalysisError {
    /// Maps a non-success HTTP status plus response body onto the taxonomy.
    pub fn from_status(provider: &str, status: StatusCode, body: String) -> Self {
        let detail = if body.trim().is_empty() {
            format!("{} returned {}", provider, status)
        } else {
            format!("{} returned {}: {}", provider, status, body.trim())
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            AnalysisError::RateLimited(detail)
        } else {
            AnalysisError::Service(detail)
        }
    }

    /// Maps a transport-level failure (connect, timeout, body read).
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        AnalysisError::Service(format!("failed to reach {}: {}", provider, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = AnalysisError::from_status(
            "OpenAI",
            StatusCode::TOO_MANY_REQUESTS,
            "slow down".to_string(),
        );
        assert!(matches!(err, AnalysisError::RateLimited(_)));
    }

    #[test]
    fn other_statuses_are_service_errors() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::BAD_REQUEST,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let err = AnalysisError::from_status("OpenAI", status, String::new());
            assert!(matches!(err, AnalysisError::Service(_)), "{}", status);
        }
    }

    #[test]
    fn status_detail_keeps_body_text() {
        let err = AnalysisError::from_status(
            "Anthropic",
            StatusCode::BAD_REQUEST,
            "invalid model".to_string(),
        );
        assert!(err.to_string().contains("invalid model"));
    }
}
