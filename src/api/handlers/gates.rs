//! Forward-auth checks for the AI assistant and attachment services.
//!
//! The reverse proxy asks here before relaying a request to one of those services. A
//! 204 admits the request and names the caller in `x-pragma-*` headers; any other
//! status is returned to the client as is. The guard chain does all the work, so the
//! handlers only describe who passed.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};

use crate::api::{context::RequestContext, error::ErrorBody};

pub const USER_ID_HEADER: &str = "x-pragma-user-id";
pub const ROLE_HEADER: &str = "x-pragma-role";
pub const SCHOOL_ID_HEADER: &str = "x-pragma-school-id";

fn admitted(context: &RequestContext) -> impl IntoResponse + use<> {
    let mut headers = HeaderMap::new();
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    set(USER_ID_HEADER, context.identity.user_id.to_string());
    set(ROLE_HEADER, context.identity.role.to_string());
    if let Some(tenant) = context.tenant_id {
        set(SCHOOL_ID_HEADER, tenant.to_string());
    }
    (StatusCode::NO_CONTENT, headers)
}

#[utoipa::path(
    post,
    path = "/v1/gates/ai",
    responses(
        (status = 204, description = "Caller may use the AI assistants"),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Not staff, or MFA not completed", body = ErrorBody),
        (status = 429, description = "AI quota exhausted", body = ErrorBody)
    ),
    tag = "gates"
)]
pub async fn admit_ai(context: RequestContext) -> impl IntoResponse {
    admitted(&context)
}

#[utoipa::path(
    post,
    path = "/v1/gates/uploads",
    responses(
        (status = 204, description = "Caller may upload an attachment"),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Not staff, or MFA not completed", body = ErrorBody),
        (status = 429, description = "Upload quota exhausted", body = ErrorBody)
    ),
    tag = "gates"
)]
pub async fn admit_upload(context: RequestContext) -> impl IntoResponse {
    admitted(&context)
}
