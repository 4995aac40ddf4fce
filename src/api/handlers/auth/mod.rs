//! Auth handlers and supporting modules.
//!
//! This module covers login with encrypted credential payloads, TOTP completion for
//! staff sessions, self-service registration, password reset intake and logout.
//!
//! ## Sessions
//!
//! A successful login issues a signed token and sets it as the `session` cookie
//! (HttpOnly, Secure, SameSite=Strict). Bearer tokens are accepted as well. Staff
//! roles receive a partial token (`mfa_done = false`) until `/v1/auth/mfa/verify`
//! succeeds; partial tokens unlock nothing but MFA verification and logout.
//!
//! ## Lockout
//!
//! - **Timed:** 5 consecutive failures lock the account for 15 minutes.
//! - **Indefinite:** 15 consecutive failures lock it until an administrator unlocks it.
//! - **Reset:** a successful login or an unlock clears the counter.

pub mod login;
pub mod logout;
pub mod mfa;
pub mod password_reset;
pub mod register;
pub(crate) mod session;
pub mod storage;
pub mod types;
mod utils;

pub use login::login;
pub use logout::logout;
pub use mfa::verify_mfa;
pub use password_reset::request_password_reset;
pub use register::register;
pub use storage::{PgSessionStore, PgUserStore, SessionStore, UserStore};
