//! Per-family request throttling.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::{
    api::{context::ClientInfo, error::ApiError, state::AppState},
    rate_limit::{RateLimitAction, RateLimitDecision},
    session_token::Identity,
};

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Debug)]
pub struct RateLimitGate {
    state: Arc<AppState>,
    action: RateLimitAction,
}

impl RateLimitGate {
    #[must_use]
    pub fn new(state: Arc<AppState>, action: RateLimitAction) -> Self {
        Self { state, action }
    }
}

/// Bucket key for the request: client IP for login, user id otherwise.
fn limit_key(gate: &RateLimitGate, request: &Request) -> Option<String> {
    match gate.action {
        RateLimitAction::Login => {
            let client = ClientInfo::from_parts(
                request.headers(),
                request.extensions(),
                gate.state.config().trusted_proxies(),
            );
            Some(
                client
                    .ip_address
                    .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            )
        }
        _ => request
            .extensions()
            .get::<Identity>()
            .map(|identity| identity.user_id.to_string()),
    }
}

/// # Errors
/// 429 `rate_limit_exceeded` with `Retry-After` once the bucket is empty.
pub async fn throttle(
    State(gate): State<RateLimitGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Per-identity families only apply behind the access gate.
    let Some(key) = limit_key(&gate, &request) else {
        return Ok(next.run(request).await);
    };

    match gate.state.rate_limiter().check(gate.action, &key) {
        RateLimitDecision::Allowed => Ok(next.run(request).await),
        RateLimitDecision::Limited { retry_after } => {
            warn!(
                action = %gate.action,
                key = %key,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "rate limit exceeded"
            );
            Err(ApiError::RateLimited {
                action: gate.action,
                retry_after,
            })
        }
    }
}
