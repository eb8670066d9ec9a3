//! Error types for the HTTP surface: [`ApiError`]/[`ErrorCode`] for
//! structured JSON error responses, plus a `From<BlinderError>` conversion
//! that maps every inner error variant without leaking raw internals
//! (raw exception text is never leaked to the model or the client).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use blinder_core::BlinderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for API responses, each mapped to one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    InvalidInput,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,

    SessionNotFound,
    DocumentNotFound,
    MessageNotFound,

    HighSeverityThreat,
    ProviderUnavailable,
    Timeout,
    Forbidden,

    InternalError,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::SessionNotFound | ErrorCode::DocumentNotFound | ErrorCode::MessageNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::HighSeverityThreat => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::InternalError | ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::PayloadTooLarge => "Payload too large",
            ErrorCode::SessionNotFound => "Session not found",
            ErrorCode::DocumentNotFound => "Document not found",
            ErrorCode::MessageNotFound => "Message not found",
            ErrorCode::HighSeverityThreat => "Content blocked by threat sanitiser",
            ErrorCode::ProviderUnavailable => "LLM provider unavailable",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::Forbidden => "Not authorized to perform this action",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error response returned by every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("Required field '{field}' is missing"))
    }

    pub fn session_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::SessionNotFound, format!("Session {id} not found"))
    }

    pub fn document_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DocumentNotFound, format!("Document {id} not found"))
    }

    pub fn payload_too_large() -> Self {
        Self::from_code(ErrorCode::PayloadTooLarge)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

/// Maps the inner error taxonomy to the HTTP layer's own, logging full
/// detail internally and exposing only a safe summary (§7).
impl From<BlinderError> for ApiError {
    fn from(err: BlinderError) -> Self {
        match &err {
            BlinderError::Pipeline(blinder_core::PipelineError::HighSeverityThreat { threats }) => {
                tracing::warn!(?threats, "rejected prompt with high-severity threats");
                ApiError::new(ErrorCode::HighSeverityThreat, "Input blocked by threat sanitiser")
                    .with_details(serde_json::json!({ "threats": threats }))
            }
            BlinderError::Orchestrator(blinder_core::OrchestratorError::SessionNotFound(id)) => {
                ApiError::session_not_found(id)
            }
            BlinderError::Llm(llm_err) => {
                tracing::error!(error = %llm_err, "LLM provider error");
                match llm_err {
                    blinder_core::LlmError::Timeout => ApiError::from_code(ErrorCode::Timeout),
                    _ => ApiError::new(ErrorCode::ProviderUnavailable, llm_err.safe_message()),
                }
            }
            BlinderError::Validation(validation_err) => ApiError::validation_failed(validation_err.0.clone()),
            BlinderError::PayloadTooLarge => ApiError::payload_too_large(),
            BlinderError::Storage(storage_err) => {
                tracing::error!(error = %storage_err, "storage error");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
            other => {
                tracing::error!(error = %other, "internal error");
                ApiError::internal_error("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_codes_cover_common_cases() {
        assert_eq!(ErrorCode::SessionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn high_severity_threat_maps_to_unprocessable_entity() {
        let err = BlinderError::Pipeline(blinder_core::PipelineError::HighSeverityThreat {
            threats: vec!["prompt_injection".to_string()],
        });
        let api_err: ApiError = err.into();
        assert_eq!(api_err.code, ErrorCode::HighSeverityThreat);
        assert!(api_err.details.is_some());
    }
}
