use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    api::{
        context::{ClientInfo, RequestContext},
        state::AppState,
    },
    audit::AuditEntry,
};

pub const HTTP_REQUEST_ENTITY: &str = "http_request";

fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// `post./v1/admin/users/<id>/unlock` style action for the catch-all entry.
pub(crate) fn request_action(method: &Method, path: &str) -> String {
    format!("{}.{path}", method.as_str().to_lowercase())
}

/// Record every mutating request that carries an identity, after the handler ran.
pub async fn record_mutations(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if is_read_only(&method) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let context = request.extensions().get::<RequestContext>().cloned();
    let client = ClientInfo::from_parts(
        request.headers(),
        request.extensions(),
        state.config().trusted_proxies(),
    );

    let response = next.run(request).await;

    if let Some(context) = context {
        let entry = AuditEntry::new(request_action(&method, &path), HTTP_REQUEST_ENTITY)
            .with_tenant(context.tenant_id)
            .with_actor(context.identity.user_id)
            .with_new_value(json!({ "status": response.status().as_u16() }))
            .with_client(client.ip_address, client.user_agent);
        state.audit().spawn_write(entry);
    }
    response
}
