use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Ingest error: {0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("Rule error: {0}")]
    Rule(#[from] matcher::RuleError),

    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] dispatch::DispatchError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,
}

impl From<leadrelay::PipelineError> for ServerError {
    fn from(err: leadrelay::PipelineError) -> Self {
        match err {
            leadrelay::PipelineError::Ingest(e) => ServerError::Ingest(e),
            leadrelay::PipelineError::Store(e) => ServerError::Store(e),
        }
    }
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            // Ingest errors carry their own status (400, 413 for oversized).
            ServerError::Ingest(err) => StatusCode::from_u16(err.http_status_code())
                .unwrap_or(StatusCode::BAD_REQUEST),
            ServerError::Rule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Store(store::StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServerError::Store(_) | ServerError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Ingest(err) => err.error_code(),
            ServerError::Rule(_) => "RULE_ERROR",
            ServerError::Store(store::StoreError::NotFound { .. }) => "NOT_FOUND",
            ServerError::Store(_) => "STORE_ERROR",
            ServerError::Dispatch(_) => "DISPATCH_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(err: std::net::AddrParseError) -> Self {
        ServerError::Config(format!("Invalid address: {err}"))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("JSON parse error: {err}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_errors_map_to_their_own_status() {
        let err = ServerError::Ingest(ingest::IngestError::PayloadTooLarge {
            size: 100,
            limit: 10,
        });
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = ServerError::Ingest(ingest::IngestError::MissingField("email"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "MISSING_FIELD");
    }

    #[test]
    fn missing_records_are_404() {
        let err = ServerError::Store(store::StoreError::NotFound {
            entity: "lead",
            id: 9,
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
