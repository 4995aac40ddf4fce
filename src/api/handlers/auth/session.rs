//! Session cookie and bearer token handling.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use tracing::warn;

use crate::{
    api::{context::ClientInfo, state::AppState},
    session_token::{IssuedToken, hash_token},
};

use super::storage::SessionRecord;

pub const SESSION_COOKIE_NAME: &str = "session";

/// Build the `HttpOnly` session cookie; `Max-Age` follows the token lifetime.
pub(crate) fn session_cookie(issued: &IssuedToken) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={}",
        issued.token, issued.max_age_seconds
    ))
}

/// Expire the session cookie immediately.
pub(crate) fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0")
}

/// Read the session token: cookie first, then `Authorization: Bearer`.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    cookie_token(headers).or_else(|| bearer_token(headers))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, token)| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Persist the hash of a freshly issued token. Failures are logged: the row only
/// serves bulk logout, and the signed token is valid without it.
pub(crate) async fn record_session(
    state: &AppState,
    issued: &IssuedToken,
    user_id: uuid::Uuid,
    tenant_id: Option<uuid::Uuid>,
    client: &ClientInfo,
) {
    let record = SessionRecord {
        user_id,
        tenant_id,
        token_hash: hash_token(&issued.token),
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        expires_at: issued.expires_at,
    };
    if let Err(err) = state.sessions().insert(&record).await {
        warn!(user_id = %user_id, "Failed to store session record: {err:#}");
    }
}
