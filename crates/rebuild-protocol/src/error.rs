//! Errors reported by the remote build service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The job description was rejected.
    InvalidArgument,
    /// The build or operation does not exist.
    NotFound,
    /// The caller may not perform this action.
    PermissionDenied,
    /// Quota exhausted; retry later.
    ResourceExhausted,
    /// Transient service outage.
    Unavailable,
    /// The request was cancelled.
    Cancelled,
    /// Unclassified service failure.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Error payload attached to a failed call or a failed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    pub code: ErrorCode,
    /// Single-line message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// NOT_FOUND for an unknown operation name.
    pub fn operation_not_found(name: &str) -> Self {
        Self::with_data(
            ErrorCode::NotFound,
            format!("operation '{}' not found", name),
            serde_json::json!({ "operation": name }),
        )
    }

    /// NOT_FOUND for an unknown build id.
    pub fn build_not_found(build_id: &str) -> Self {
        Self::with_data(
            ErrorCode::NotFound,
            format!("build '{}' not found", build_id),
            serde_json::json!({ "build_id": build_id }),
        )
    }

    /// INVALID_ARGUMENT for a rejected job description.
    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, reason)
    }

    /// Whether the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::ResourceExhausted | ErrorCode::Unavailable)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}
