//! Error Types for LeanCRM API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes:
//!
//! ```json
//! {"error": "DEMO_SESSION_EXPIRED", "message": "Demo session expired"}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leancrm_core::DemoError;
use leancrm_storage::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// No demo store exists for the caller and the request cannot create one
    DemoSessionNotInitialized,

    /// The caller's demo store outlived its window and was destroyed
    DemoSessionExpired,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    // ========================================================================
    // Server Errors (429, 500, 503)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// A demo store could not be created
    ProvisionFailed,

    /// Demo endpoints were called while demo mode is off
    DemoModeDisabled,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::DemoSessionNotInitialized | ErrorCode::DemoSessionExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::DemoModeDisabled => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::ProvisionFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::DemoSessionNotInitialized => "Demo session not initialized",
            ErrorCode::DemoSessionExpired => "Demo session expired",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",

            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",

            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ProvisionFailed => "Failed to provision demo store",
            ErrorCode::DemoModeDisabled => "Demo mode is not enabled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    #[serde(rename = "error")]
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, retry hints, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn session_not_initialized() -> Self {
        Self::from_code(ErrorCode::DemoSessionNotInitialized)
    }

    pub fn session_expired() -> Self {
        Self::from_code(ErrorCode::DemoSessionExpired)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
        .with_details(serde_json::json!({ "field": field }))
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' must be {}", field, expected),
        )
    }

    /// Create an EntityNotFound error.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn entity_already_exists(entity_type: &str, key: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityAlreadyExists,
            format!("{} '{}' already exists", entity_type, key),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn provision_failed() -> Self {
        Self::from_code(ErrorCode::ProvisionFailed)
    }

    pub fn demo_mode_disabled() -> Self {
        Self::from_code(ErrorCode::DemoModeDisabled)
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Demo-layer failures. Expiry and not-found carry fixed messages; internal
/// failures are logged in full and masked.
impl From<DemoError> for ApiError {
    fn from(err: DemoError) -> Self {
        match err {
            DemoError::DemoModeDisabled => ApiError::demo_mode_disabled(),
            DemoError::IdentityNotFound => ApiError::session_not_initialized(),
            DemoError::SessionExpired => ApiError::session_expired(),
            DemoError::InvalidIdentity { reason } => {
                tracing::debug!(reason = %reason, "Rejected malformed demo identity");
                ApiError::session_not_initialized()
            }
            DemoError::Provision(e) => {
                tracing::error!("Demo store provisioning failed: {}", e);
                ApiError::provision_failed()
            }
            DemoError::Registry(e) => {
                tracing::error!("Demo registry error: {}", e);
                ApiError::internal_error("Internal server error")
            }
            DemoError::Config(e) => {
                tracing::error!("Demo configuration error: {}", e);
                ApiError::internal_error("Internal server error")
            }
            DemoError::TaskFailed { reason } => {
                tracing::error!("Demo task failed: {}", reason);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Convert from rusqlite::Error to ApiError.
impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::database_error("Database operation failed")
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Sqlite(e) => e.into(),
            StoreError::Task(reason) => {
                tracing::error!("Store task failed: {}", reason);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {:?}", err);
        ApiError::internal_error("Internal server error")
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use leancrm_core::ProvisionError;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(
            ErrorCode::DemoSessionNotInitialized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DemoSessionExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DemoModeDisabled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::ProvisionFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::TooManyRequests.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_error_body_uses_error_field() -> Result<(), serde_json::Error> {
        let err = ApiError::session_expired();
        let json = serde_json::to_value(&err)?;

        assert_eq!(json["error"], "DEMO_SESSION_EXPIRED");
        assert_eq!(json["message"], "Demo session expired");
        assert!(json.get("details").is_none());

        let deserialized: ApiError = serde_json::from_value(json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_demo_error_conversion() {
        let err: ApiError = DemoError::IdentityNotFound.into();
        assert_eq!(err.code, ErrorCode::DemoSessionNotInitialized);

        let err: ApiError = DemoError::DemoModeDisabled.into();
        assert_eq!(err.message, "Demo mode is not enabled");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = DemoError::Provision(ProvisionError::SchemaFailed {
            reason: "no such table: users".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ProvisionFailed);
        assert!(!err.message.contains("users"));
    }

    #[test]
    fn test_database_errors_are_masked() {
        let err: ApiError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "Database operation failed");
    }

    #[test]
    fn test_missing_field_details() {
        let err = ApiError::missing_field("name");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("name"));
        assert_eq!(err.details, Some(serde_json::json!({ "field": "name" })));
    }
}
