//! HTTP error boundary.
//!
//! Handlers and middleware return [`ApiError`]; it renders as
//! `{"error": "<code>", "message": "<text>"}` with the matching status. Internal
//! errors are logged here and reach the client as a generic message only.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::rate_limit::RateLimitAction;

/// Longest `Retry-After` we advertise, even for the daily document quota.
const MAX_RETRY_AFTER_SECONDS: u64 = 24 * 60 * 60;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is deactivated")]
    AccountInactive,
    #[error("account is temporarily locked due to too many failed attempts")]
    AccountLocked,
    #[error("multi-factor authentication required")]
    MfaRequired,
    #[error("invalid MFA code")]
    InvalidMfaCode,
    #[error("MFA is not configured for this account")]
    MfaNotSetup,
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("too many requests, please try again later")]
    RateLimited {
        action: RateLimitAction,
        retry_after: Duration,
    },
    #[error("failed to decrypt credentials")]
    DecryptionFailed,
    #[error("{0}")]
    WeakPassword(String),
    #[error("this password has appeared in a data breach, please choose another")]
    BreachedPassword,
    #[error("invalid X-School-ID header")]
    InvalidSchoolId,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("an account with this email already exists")]
    EmailExists,
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountInactive => "account_inactive",
            Self::AccountLocked => "account_locked",
            Self::MfaRequired => "mfa_required",
            Self::InvalidMfaCode => "invalid_mfa_code",
            Self::MfaNotSetup => "mfa_not_setup",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::DecryptionFailed => "decryption_failed",
            Self::WeakPassword(_) => "weak_password",
            Self::BreachedPassword => "breached_password",
            Self::InvalidSchoolId => "invalid_school_id",
            Self::InvalidRequest(_) => "invalid_request",
            Self::EmailExists => "email_exists",
            Self::NotFound => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::InvalidMfaCode | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountInactive | Self::MfaRequired | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::AccountLocked | Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MfaNotSetup
            | Self::DecryptionFailed
            | Self::WeakPassword(_)
            | Self::BreachedPassword
            | Self::InvalidSchoolId
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EmailExists => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(err) => {
                error!("Request failed: {err:#}");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let Self::RateLimited { retry_after, .. } = &self {
            // Round up so clients never retry a moment too early.
            let seconds = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0))
                .clamp(1, MAX_RETRY_AFTER_SECONDS);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
