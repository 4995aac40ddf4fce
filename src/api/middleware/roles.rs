use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{
    api::{context::RequestContext, error::ApiError},
    roles::Role,
};

/// Flat allow-list of roles for a route group.
#[derive(Clone, Debug)]
pub struct RoleGate {
    allowed: Arc<[Role]>,
}

impl RoleGate {
    #[must_use]
    pub fn new(allowed: &[Role]) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }

    /// Admins and platform operators.
    #[must_use]
    pub fn administrators() -> Self {
        Self::new(&[Role::Admin, Role::SuperAdmin])
    }

    /// Everyone who teaches or administers.
    #[must_use]
    pub fn staff() -> Self {
        Self::new(&[Role::Teacher, Role::Admin, Role::SuperAdmin])
    }

    #[must_use]
    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// # Errors
/// 401 without a request context, 403 when the role is not allowed.
pub async fn require_roles(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = request
        .extensions()
        .get::<RequestContext>()
        .map(|context| context.identity.role)
        .ok_or(ApiError::Unauthorized)?;
    if !gate.allows(role) {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}
