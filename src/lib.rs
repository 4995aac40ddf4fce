//! # Pragma (trust and access-control core)
//!
//! `pragma` is the security core of a multi-tenant school management backend. Every
//! request that reaches a business handler has already passed through the pieces in
//! this crate:
//!
//! ```text
//! request -> AccessGate -> TenantScope -> RoleGate -> RateLimiter -> handler -> AuditLedger
//! ```
//!
//! ## Tenant Model (Schools)
//!
//! Schools are the tenant boundary. A signed session carries the school the user
//! belongs to; platform operators (`super_admin`) may carry no school at all and pick
//! one per request with the `X-School-ID` header. Handlers read the effective school
//! only from the request context, never from client input.
//!
//! ## Authentication
//!
//! - **Credentials:** Argon2id hashes (PHC strings), a minimum length policy and a
//!   k-anonymity breach lookup that fails open.
//! - **Login payloads:** clients encrypt `{email, password}` with AES-256-GCM under a key
//!   provisioned out of band, so plaintext passwords never appear in request bodies.
//! - **Sessions:** Ed25519-signed compact JWS tokens with role-dependent lifetimes and an
//!   `mfa_done` flag. Staff roles must complete TOTP before the token unlocks anything
//!   beyond MFA verification and logout.
//!
//! ## Authorization & Abuse Protection
//!
//! Roles are a closed set checked against flat allow-lists. In-memory token buckets
//! throttle general traffic, login attempts, AI calls, document generation, uploads and
//! password resets. Every mutating request that carries an identity lands in the
//! append-only audit ledger.

pub mod api;
pub mod audit;
pub mod cli;
pub mod credentials;
pub mod crypto;
pub mod rate_limit;
pub mod roles;
pub mod session_token;
pub mod shortid;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
