//! Credential handling: password hashing, strength policy, breach lookups, lockout
//! and the TOTP second factor.

pub mod breach;
pub mod lockout;
pub mod password;
pub mod totp;

pub use breach::{BreachCheck, BreachChecker, BreachLookupError, BreachPolicy};
pub use lockout::{FailedLogin, LockState, LockoutPolicy};
pub use password::{PasswordError, WeakPassword, hash_password, validate_strength, verify_password};
pub use totp::TotpVerifier;
