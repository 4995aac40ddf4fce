//! Session introspection.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{context::RequestContext, error::ErrorBody},
    session_token::Identity,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: Identity,
    /// School the request acts on; differs from `identity.tenant_id` under an override.
    pub effective_school_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    params(
        ("X-School-ID" = Option<String>, Header, description = "Tenant override, super admins only")
    ),
    responses(
        (status = 200, description = "Return the authenticated identity.", body = MeResponse),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "MFA not completed.", body = ErrorBody)
    ),
    tag = "me"
)]
pub async fn get_me(context: RequestContext) -> Json<MeResponse> {
    Json(MeResponse {
        identity: context.identity,
        effective_school_id: context.tenant_id,
    })
}
