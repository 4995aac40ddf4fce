//! Typed request context shared by middleware and handlers.

use axum::{
    Json, async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{Extensions, HeaderMap, header::USER_AGENT, request::Parts},
};
use serde::de::DeserializeOwned;
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use uuid::Uuid;

use super::{error::ApiError, state::AppState};
use crate::session_token::Identity;

/// Identity plus the tenant the request acts on.
///
/// `tenant_id` is the effective tenant: the identity's own school, or the
/// `X-School-ID` override for a super admin. Handlers read the tenant from here only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: Identity,
    pub tenant_id: Option<Uuid>,
}

impl RequestContext {
    /// Effective tenant, or 403 for an operator acting without an override.
    ///
    /// # Errors
    /// Returns [`ApiError::Forbidden`] when no tenant is in scope.
    pub fn require_tenant(&self) -> Result<Uuid, ApiError> {
        self.tenant_id.ok_or(ApiError::Forbidden)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Proxies whose forwarding headers are believed.
///
/// Forwarding headers are only read when the TCP peer is one of these addresses;
/// otherwise the peer address is the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    #[must_use]
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }

    /// Client address for a request that arrived from `peer`.
    ///
    /// Behind a trusted proxy this is the right-most `X-Forwarded-For` hop that is
    /// not itself a trusted proxy (entries to its left are client-supplied), then
    /// `X-Real-IP`, then the proxy itself.
    #[must_use]
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        let peer = peer?.ip();
        if !self.contains(peer) {
            return Some(peer);
        }
        let forwarded = forwarded_for(headers)
            .into_iter()
            .rev()
            .find(|hop| !self.contains(*hop));
        Some(forwarded.or_else(|| real_ip(headers)).unwrap_or(peer))
    }
}

/// Caller address and user agent, recorded on sessions and audit entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub(crate) fn from_parts(
        headers: &HeaderMap,
        extensions: &Extensions,
        proxies: &TrustedProxies,
    ) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip_address = proxies
            .client_ip(headers, peer)
            .map(|ip| ip.to_string());
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Self {
            ip_address,
            user_agent,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let proxies = parts
            .extensions
            .get::<Arc<AppState>>()
            .map(|state| state.config().trusted_proxies().clone())
            .unwrap_or_default();
        Ok(Self::from_parts(&parts.headers, &parts.extensions, &proxies))
    }
}

/// Every parseable `X-Forwarded-For` hop, left to right.
fn forwarded_for(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect()
}

fn real_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
}

/// `Json` extractor whose rejections render as `invalid_request`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::invalid_request(rejection.body_text())),
        }
    }
}
