//! Every 4xx/5xx response is JSON with one shape.
//!
//! ```json
//! { "code": "RuntimeError", "name": "TypeError", "message": "bad data", "requestLog": [] }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fn_adapter::RequestLogEntry;
use fn_sandbox::{InputError, SandboxError};
use fn_secrets::SecretsError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "requestLog", skip_serializing_if = "Option::is_none")]
    pub request_log: Option<Vec<RequestLogEntry>>,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub name: Option<String>,
    pub details: Option<String>,
    pub request_log: Option<Vec<RequestLogEntry>>,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            name: None,
            details: None,
            request_log: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    /// The script ran but its result is unusable.
    pub fn invalid_output(msg: impl Into<String>, log: Vec<RequestLogEntry>) -> Self {
        Self {
            request_log: Some(log),
            ..Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_output", msg)
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
    }
}

impl From<InputError> for AppError {
    fn from(e: InputError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
    }
}

impl From<SandboxError> for AppError {
    fn from(e: SandboxError) -> Self {
        Self {
            name: Some(e.name().to_string()),
            details: Some(e.details().to_string()),
            request_log: e.request_log().map(<[RequestLogEntry]>::to_vec),
            ..Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.kind(), e.message())
        }
    }
}

impl From<SecretsError> for AppError {
    fn from(e: SecretsError) -> Self {
        let status = match e {
            SecretsError::Config(_) | SecretsError::Encryption(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, e.name(), e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
            name: self.name,
            details: self.details,
            request_log: self.request_log,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_serializes_without_optional_fields() {
        let body = ApiErrorBody {
            code: "bad_request".into(),
            message: "source param is missing".into(),
            name: None,
            details: None,
            request_log: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "bad_request");
        assert!(json.get("name").is_none());
        assert!(json.get("requestLog").is_none());
    }

    #[test]
    fn sandbox_errors_are_unprocessable() {
        let err = AppError::from(SandboxError::timeout(10_000));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "RuntimeError");
        assert_eq!(err.name.as_deref(), Some("TimeoutError"));
        assert_eq!(err.request_log.as_deref().map(<[_]>::len), Some(0));
    }

    #[test]
    fn config_errors_are_bad_requests() {
        let err = AppError::from(SecretsError::Config(fn_secrets::ConfigError::invalid("source")));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "ConfigError");
        assert_eq!(err.message, "source is not correctly specified in config");
    }
}
