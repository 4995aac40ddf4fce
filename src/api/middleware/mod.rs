//! Request pipeline for protected routes.
//!
//! A guarded route group runs, in order: [`access::authenticate`] (session token,
//! MFA state), [`tenant::scope_tenant`] (effective school), an optional
//! [`roles::require_roles`] allow-list, one [`rate_limit::throttle`] per limiter
//! family, then [`audit::record_mutations`] around the handler.

pub mod access;
pub mod audit;
pub mod rate_limit;
pub mod roles;
pub mod security_headers;
pub mod tenant;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};
use std::sync::Arc;

use self::{
    access::{AccessGate, MfaEnforcement},
    rate_limit::RateLimitGate,
    roles::RoleGate,
};
use super::state::AppState;
use crate::rate_limit::RateLimitAction;

#[derive(Clone, Debug)]
pub struct RouteGuard {
    mfa: MfaEnforcement,
    roles: Option<RoleGate>,
    limits: Vec<RateLimitAction>,
}

impl RouteGuard {
    /// Full session required, general limiter.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            mfa: MfaEnforcement::Required,
            roles: None,
            limits: vec![RateLimitAction::General],
        }
    }

    /// Partial staff sessions allowed, general limiter.
    #[must_use]
    pub fn mfa_exempt() -> Self {
        Self {
            mfa: MfaEnforcement::Exempt,
            ..Self::authenticated()
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: RoleGate) -> Self {
        self.roles = Some(roles);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, action: RateLimitAction) -> Self {
        if !self.limits.contains(&action) {
            self.limits.push(action);
        }
        self
    }
}

/// Wrap every route of `router` in the protected pipeline.
///
/// `route_layer` runs the last layer added first, so the chain is assembled
/// from the handler outwards.
pub fn guard(router: Router, state: &Arc<AppState>, route_guard: RouteGuard) -> Router {
    let mut router = router.route_layer(from_fn_with_state(
        state.clone(),
        audit::record_mutations,
    ));
    for action in route_guard.limits.iter().rev() {
        router = router.route_layer(from_fn_with_state(
            RateLimitGate::new(state.clone(), *action),
            rate_limit::throttle,
        ));
    }
    if let Some(roles) = route_guard.roles {
        router = router.route_layer(from_fn_with_state(roles, roles::require_roles));
    }
    router
        .route_layer(from_fn(tenant::scope_tenant))
        .route_layer(from_fn_with_state(
            AccessGate::new(state.clone(), route_guard.mfa),
            access::authenticate,
        ))
}

/// Business feature families that plug into the protected pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtectedFeature {
    /// AI assistants: staff only, AI limiter.
    Ai,
    /// Document generation: any full session, daily document limiter.
    Documents,
    /// Attachment uploads: staff only, upload limiter.
    Uploads,
}

impl ProtectedFeature {
    #[must_use]
    pub fn route_guard(self) -> RouteGuard {
        match self {
            Self::Ai => RouteGuard::authenticated()
                .with_roles(RoleGate::staff())
                .with_limit(RateLimitAction::Ai),
            Self::Documents => {
                RouteGuard::authenticated().with_limit(RateLimitAction::DocumentGeneration)
            }
            Self::Uploads => RouteGuard::authenticated()
                .with_roles(RoleGate::staff())
                .with_limit(RateLimitAction::FileUpload),
        }
    }
}

/// Mount feature routes behind the guard for `feature`.
pub fn protect(routes: Router, state: &Arc<AppState>, feature: ProtectedFeature) -> Router {
    guard(routes, state, feature.route_guard())
}
