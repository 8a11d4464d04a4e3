//! # Terminal Context Errors
//!
//! Structured error handling for context resolution, the server gateway and
//! client-side storage.
//!
//! Every failure carries an [`ErrorCategory`]. Callers branch on the category,
//! never on message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories that drive retry and UI behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No eligible profiles; unrecoverable without admin action.
    NoAccess,
    /// Several profiles are eligible and none is active.
    SelectionRequired,
    /// The secondary resource (e.g. an open shift) does not exist.
    SecondaryResourceMissing,
    /// Network or server failure.
    Transient,
    /// Unexpected server payload. Retried like `Transient`.
    Malformed,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::NoAccess => "no_access",
            ErrorCategory::SelectionRequired => "selection_required",
            ErrorCategory::SecondaryResourceMissing => "secondary_resource_missing",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Malformed => "malformed",
        }
    }

    /// Only transient-like failures may change on a retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCategory::Transient | ErrorCategory::Malformed)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context resolution errors
///
/// `Clone` so one in-flight resolution can be shared by every waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No eligible profiles for this operator")]
    NoAccess,

    #[error("Profile selection required: {eligible} eligible profiles")]
    SelectionRequired { eligible: usize },

    #[error("Transient failure: {reason}")]
    Transient { reason: String },

    #[error("Malformed server payload: {reason}")]
    Malformed { reason: String },

    #[error("Invalid context input: {field} must not be empty")]
    InvalidInput { field: String },
}

impl ResolutionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ResolutionError::NoAccess => ErrorCategory::NoAccess,
            ResolutionError::SelectionRequired { .. } | ResolutionError::InvalidInput { .. } => {
                ErrorCategory::SelectionRequired
            }
            ResolutionError::Transient { .. } => ErrorCategory::Transient,
            ResolutionError::Malformed { .. } => ErrorCategory::Malformed,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        ResolutionError::Transient {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        ResolutionError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Server gateway errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: server answered {status}")]
    Unauthorized { status: u16 },

    #[error("Transient gateway failure: {reason}")]
    Transient { reason: String },

    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::NotFound { .. } => ErrorCategory::SecondaryResourceMissing,
            GatewayError::Unauthorized { .. } | GatewayError::Transient { .. } => {
                ErrorCategory::Transient
            }
            GatewayError::Malformed { .. } | GatewayError::Rejected { .. } => {
                ErrorCategory::Malformed
            }
        }
    }
}

impl From<GatewayError> for ResolutionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Malformed { endpoint, reason } => ResolutionError::Malformed {
                reason: format!("{endpoint}: {reason}"),
            },
            GatewayError::Rejected { status, message } => ResolutionError::Malformed {
                reason: format!("rejected with {status}: {message}"),
            },
            GatewayError::NotFound { resource } => ResolutionError::Malformed {
                reason: format!("endpoint not found: {resource}"),
            },
            other => ResolutionError::Transient {
                reason: other.to_string(),
            },
        }
    }
}

/// Client-side storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage quota exceeded writing {key}")]
    QuotaExceeded { key: String },

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}
