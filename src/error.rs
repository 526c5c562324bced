//! Structured error types surfaced to consumers of the mirror.

use serde::Serialize;
use std::fmt;

use crate::gateway::GatewayError;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Caught client-side, never reaches the gateway
    MissingRequiredField,
    InvalidFieldValue,

    // Remote failures
    NetworkError,
    ApiError,
    DecodeError,

    // Non-fatal
    PartialBulkFailure,

    // Local state
    EntityNotFound,
    Stopped,
}

impl ErrorCode {
    /// Validation errors are raised before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue
        )
    }
}

/// Structured error recorded by the scheduler and the mutation coordinator.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SyncError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            status: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("Entity not found: {}", id))
    }

    pub fn partial_bulk_failure(deleted: u64, failed: u64) -> Self {
        Self::new(
            ErrorCode::PartialBulkFailure,
            format!("Deleted {} item(s), {} failed", deleted, failed),
        )
    }

    pub fn stopped() -> Self {
        Self::new(ErrorCode::Stopped, "Mirror has been torn down")
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncError {}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(details) => {
                SyncError::new(ErrorCode::NetworkError, crate::gateway::NETWORK_ERROR_MESSAGE)
                    .with_details(details)
            }
            GatewayError::Api { status, message } => {
                SyncError::new(ErrorCode::ApiError, message).with_status(status)
            }
            GatewayError::Decode(details) => {
                SyncError::new(ErrorCode::DecodeError, "Unexpected response from server")
                    .with_details(details)
            }
        }
    }
}

/// Result type for mirror operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
