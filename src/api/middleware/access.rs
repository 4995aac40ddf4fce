//! Session authentication.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::api::{error::ApiError, handlers::auth::session::extract_session_token, state::AppState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MfaEnforcement {
    /// Staff sessions must have completed TOTP.
    Required,
    /// Reachable with a partial session (MFA verify, logout).
    Exempt,
}

#[derive(Clone, Debug)]
pub struct AccessGate {
    state: Arc<AppState>,
    mfa: MfaEnforcement,
}

impl AccessGate {
    #[must_use]
    pub fn new(state: Arc<AppState>, mfa: MfaEnforcement) -> Self {
        Self { state, mfa }
    }
}

/// Validate the session token and publish the [`Identity`](crate::session_token::Identity).
///
/// # Errors
/// 401 when the token is missing or invalid, 403 `mfa_required` for a partial
/// staff session on a route that is not MFA-exempt.
pub async fn authenticate(
    State(gate): State<AccessGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers()).ok_or(ApiError::Unauthorized)?;
    let identity = gate.state.tokens().validate(&token).map_err(|err| {
        // Reason stays in the logs; clients only see 401.
        debug!("session token rejected: {err}");
        ApiError::Unauthorized
    })?;

    if gate.mfa == MfaEnforcement::Required && identity.is_partial() {
        return Err(ApiError::MfaRequired);
    }

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
