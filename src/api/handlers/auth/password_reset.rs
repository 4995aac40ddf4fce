use axum::{extract::Extension, http::StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{types::PasswordResetRequest, utils::normalize_email};
use crate::{
    api::{
        context::{ClientInfo, JsonBody},
        error::{ApiError, ErrorBody},
        state::AppState,
    },
    audit::AuditEntry,
    rate_limit::{RateLimitAction, RateLimitDecision},
};

/// Accept a reset request. The answer never reveals whether the account exists;
/// delivering the reset link is left to the mail service watching the audit log.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Request accepted"),
        (status = 429, description = "Too many requests for this email", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    state: Extension<Arc<AppState>>,
    client: ClientInfo,
    JsonBody(request): JsonBody<PasswordResetRequest>,
) -> Result<StatusCode, ApiError> {
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return Err(ApiError::invalid_request("email is required"));
    }

    let action = RateLimitAction::PasswordReset;
    if let RateLimitDecision::Limited { retry_after } = state.rate_limiter().check(action, &email)
    {
        warn!(action = %action, "password reset throttled");
        return Err(ApiError::RateLimited {
            action,
            retry_after,
        });
    }

    match state.users().find_by_email(&email).await {
        Ok(Some(user)) if user.is_active => {
            info!(user_id = %user.id, "password reset requested");
            state.audit().spawn_write(
                AuditEntry::new("user.password_reset_requested", "user")
                    .with_tenant(user.tenant_id)
                    .with_entity(user.id)
                    .with_new_value(json!({ "email": email }))
                    .with_client(client.ip_address, client.user_agent),
            );
        }
        Ok(_) => debug!("password reset for unknown or inactive account"),
        Err(err) => error!("Failed to look up account for password reset: {err:#}"),
    }

    Ok(StatusCode::ACCEPTED)
}
