//! Self-service registration for families.
//!
//! Staff accounts are provisioned by school administrators and cannot be created here.

use anyhow::Context;
use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    storage::{InsertOutcome, NewUser},
    types::{RegisterRequest, RegisterResponse},
    utils::{normalize_email, valid_email},
};
use crate::{
    api::{
        context::{ClientInfo, JsonBody},
        error::{ApiError, ErrorBody},
        state::AppState,
    },
    audit::AuditEntry,
    credentials::{hash_password, validate_strength},
    roles::Role,
    shortid,
};

const MAX_NAME_CHARS: usize = 100;
const PUBLIC_ID_ATTEMPTS: usize = 3;

fn validate_name(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    let chars = value.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(ApiError::invalid_request(format!(
            "{field} must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(value.to_string())
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid input, weak or breached password", body = ErrorBody),
        (status = 403, description = "Role cannot self-register", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    client: ClientInfo,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !matches!(request.role, Role::Parent | Role::Student) {
        return Err(ApiError::Forbidden);
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::invalid_request("invalid email address"));
    }
    let first_name = validate_name("first_name", &request.first_name)?;
    let last_name = validate_name("last_name", &request.last_name)?;
    validate_strength(&request.password).map_err(|err| ApiError::WeakPassword(err.0))?;

    let breach = state.breach().check(&request.password).await;
    if breach.breached {
        return Err(ApiError::BreachedPassword);
    }
    if let Some(err) = &breach.error {
        warn!(policy = ?state.breach().policy(), "breach check skipped: {err}");
    }

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")?;

    let mut new_user = NewUser {
        tenant_id: request.school_id,
        public_id: String::new(),
        role: request.role,
        email,
        password_hash,
        first_name,
        last_name,
        phone: request
            .phone
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty()),
    };

    let mut created = None;
    for _ in 0..PUBLIC_ID_ATTEMPTS {
        new_user.public_id = shortid::generate().context("failed to generate public id")?;
        match state.users().insert_user(&new_user).await? {
            InsertOutcome::Created(user_id) => {
                created = Some(user_id);
                break;
            }
            InsertOutcome::EmailTaken => return Err(ApiError::EmailExists),
            InsertOutcome::PublicIdTaken => {
                info!(public_id = %new_user.public_id, "public id collision, retrying");
            }
        }
    }
    let user_id = created.context("exhausted public id attempts")?;

    state
        .audit()
        .write(
            AuditEntry::new("user.register", "user")
                .with_tenant(Some(new_user.tenant_id))
                .with_actor(user_id)
                .with_entity(user_id)
                .with_new_value(json!({ "email": new_user.email, "role": new_user.role }))
                .with_client(client.ip_address, client.user_agent),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            public_id: new_user.public_id,
        }),
    ))
}
