use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::session::clear_session_cookie;
use crate::api::{context::RequestContext, state::AppState};

/// Remove every stored session of the caller and clear the cookie.
///
/// Tokens already handed out stay valid until they expire; only the session rows go.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Sessions cleared"),
        (status = 401, description = "No valid session")
    ),
    tag = "auth"
)]
pub async fn logout(
    state: Extension<Arc<AppState>>,
    context: RequestContext,
) -> impl IntoResponse {
    let user_id = context.identity.user_id;
    match state.sessions().delete_for_user(user_id).await {
        Ok(removed) => debug!(user_id = %user_id, removed, "sessions deleted"),
        Err(err) => error!(user_id = %user_id, "Failed to delete sessions: {err:#}"),
    }

    // Always clear the cookie, even if the session rows could not be removed.
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_session_cookie());
    (StatusCode::NO_CONTENT, headers)
}
