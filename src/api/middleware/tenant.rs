//! Effective tenant derivation.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use uuid::Uuid;

use crate::{
    api::{context::RequestContext, error::ApiError},
    session_token::Identity,
};

/// Header a super admin sends to act inside a specific school.
pub const SCHOOL_OVERRIDE_HEADER: &str = "x-school-id";

/// Turn the authenticated identity into a [`RequestContext`].
///
/// # Errors
/// 401 without an identity, 400 `invalid_school_id` for a malformed override.
pub async fn scope_tenant(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(ApiError::Unauthorized)?;
    let tenant_id = effective_tenant(&identity, request.headers())?;
    request
        .extensions_mut()
        .insert(RequestContext { identity, tenant_id });
    Ok(next.run(request).await)
}

/// Only roles allowed to cross tenants may override; the header is ignored otherwise.
pub(crate) fn effective_tenant(
    identity: &Identity,
    headers: &HeaderMap,
) -> Result<Option<Uuid>, ApiError> {
    if identity.role.may_override_tenant()
        && let Some(value) = headers.get(SCHOOL_OVERRIDE_HEADER)
    {
        let raw = value.to_str().map_err(|_| ApiError::InvalidSchoolId)?.trim();
        if !raw.is_empty() {
            let tenant = Uuid::parse_str(raw).map_err(|_| ApiError::InvalidSchoolId)?;
            return Ok(Some(tenant));
        }
    }
    Ok(identity.tenant_id)
}
