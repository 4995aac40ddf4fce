//! Second factor: upgrade a partial staff session once TOTP verifies.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;

use super::{
    session::{record_session, session_cookie},
    types::{MfaVerifyRequest, MfaVerifyResponse},
};
use crate::api::{
    context::{ClientInfo, JsonBody, RequestContext},
    error::{ApiError, ErrorBody},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Code accepted; full session cookie set", body = MfaVerifyResponse),
        (status = 400, description = "MFA not configured", body = ErrorBody),
        (status = 401, description = "Missing session or wrong code", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_mfa(
    state: Extension<Arc<AppState>>,
    context: RequestContext,
    client: ClientInfo,
    JsonBody(request): JsonBody<MfaVerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = context.identity;
    let secret = state
        .users()
        .mfa_secret(identity.user_id)
        .await?
        .ok_or(ApiError::MfaNotSetup)?;

    if !state.totp().verify(&secret, &request.code)? {
        info!(user_id = %identity.user_id, "invalid MFA code");
        return Err(ApiError::InvalidMfaCode);
    }

    // Re-issue for the identity's own school, not a super admin override.
    let issued = state
        .tokens()
        .issue(
            identity.user_id,
            identity.tenant_id,
            identity.role,
            &identity.email,
            true,
        )
        .context("failed to issue session token")?;
    record_session(&state, &issued, identity.user_id, identity.tenant_id, &client).await;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        session_cookie(&issued).context("failed to build session cookie")?,
    );
    Ok((headers, Json(MfaVerifyResponse { ok: true })))
}
