//! Operator actions on user accounts.
//!
//! Flow Overview:
//! 1) Guarded by the administrator role gate and a full (MFA-complete) session.
//! 2) Resolve the target user inside the effective school; users of other schools
//!    are reported as missing.
//! 3) Apply the change and write an explicit audit entry with old/new snapshots.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    api::{
        context::{ClientInfo, RequestContext},
        error::{ApiError, ErrorBody},
        state::AppState,
    },
    audit::AuditEntry,
    credentials::LockState,
    roles::Role,
};

#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/unlock",
    params(("user_id" = Uuid, Path, description = "User to unlock")),
    responses(
        (status = 204, description = "Failure counter and lock cleared"),
        (status = 403, description = "Not an administrator or no school in scope", body = ErrorBody),
        (status = 404, description = "No such user in this school", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn unlock_user(
    state: Extension<Arc<AppState>>,
    context: RequestContext,
    client: ClientInfo,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = state
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Operators without an override act platform-wide; everyone else stays in their school.
    let operator_wide = context.identity.role == Role::SuperAdmin && context.tenant_id.is_none();
    if !operator_wide {
        let tenant = context.require_tenant()?;
        if user.tenant_id != Some(tenant) {
            return Err(ApiError::NotFound);
        }
    }

    state.users().clear_lockout(user.id).await?;
    info!(user_id = %user.id, actor = %context.identity.user_id, "account unlocked");

    let now = chrono::Utc::now();
    state
        .audit()
        .write(
            AuditEntry::new("user.unlock", "user")
                .with_tenant(user.tenant_id)
                .with_actor(context.identity.user_id)
                .with_entity(user.id)
                .with_old_value(json!({
                    "failed_login_attempts": user.failed_login_attempts,
                    "locked": user.lock.is_locked(now),
                    "locked_indefinitely": user.lock == LockState::Indefinite,
                }))
                .with_new_value(json!({
                    "failed_login_attempts": 0,
                    "locked": false,
                    "locked_indefinitely": false,
                }))
                .with_client(client.ip_address, client.user_agent),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
