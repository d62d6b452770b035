//! Service error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Device capabilities a marking flow may need from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Camera,
    Bluetooth,
    Geolocation,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Capability::Camera => "camera",
            Capability::Bluetooth => "bluetooth",
            Capability::Geolocation => "geolocation",
        })
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid credentials")]
    AuthFailure,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{check} check failed: {reason}")]
    VerificationFailure { check: &'static str, reason: String },

    #[error("{0} access denied")]
    DeviceAccessDenied(Capability),

    #[error("cannot {action} from state {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("Student already holds an open movement pass")]
    AlreadyActive,

    #[error("Attendance already marked for this class today")]
    AlreadyMarked,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid_transition(from: impl std::fmt::Display, action: &'static str) -> Self {
        AppError::InvalidTransition {
            from: from.to_string(),
            action,
        }
    }

    /// Stable machine-readable code, also used by the marking state machine.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthFailure => "auth_failure",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::VerificationFailure { .. } => "verification_failure",
            AppError::DeviceAccessDenied(_) => "device_access_denied",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::AlreadyActive => "already_active",
            AppError::AlreadyMarked => "already_marked",
            AppError::Cancelled => "cancelled",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::AuthFailure | AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::DeviceAccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::VerificationFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidTransition { .. }
            | AppError::AlreadyActive
            | AppError::AlreadyMarked => StatusCode::CONFLICT,
            AppError::Cancelled => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let reason = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "success": false, "code": self.code(), "reason": reason });
        (status, axum::Json(body)).into_response()
    }
}
