use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed")]
    Auth,

    /// Unknown template or a filter outside the template's allow-list.
    /// Always raised before any SQL text exists.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("query execution failed: {context}")]
    Execution {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// A result row lacks a column the report mapping requires.
    #[error("malformed row: missing column '{column}' for {report}")]
    MalformedRow {
        report: &'static str,
        column: String,
    },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn execution(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ServiceError::Execution {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether a caller may safely reissue the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout(_) | ServiceError::Execution { .. }
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            ServiceError::Execution { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::MalformedRow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !matches!(self, ServiceError::InvalidFilter(_) | ServiceError::Auth) {
            error!(error = %self, retryable = self.is_retryable(), "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let cases = [
            (
                ServiceError::InvalidFilter("column 'x'".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::execution("summary", anyhow::anyhow!("connection refused")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ServiceError::MalformedRow {
                    report: "summary",
                    column: "servers".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Timeout(std::time::Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (ServiceError::Auth, StatusCode::UNAUTHORIZED),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn execution_error_keeps_cause() {
        let err = ServiceError::execution("monthly series", anyhow::anyhow!("relation missing"));
        let source = std::error::Error::source(&err).expect("cause should be attached");
        assert_eq!(source.to_string(), "relation missing");
        assert!(err.is_retryable());
        assert!(!ServiceError::InvalidFilter("x".into()).is_retryable());
    }
}
