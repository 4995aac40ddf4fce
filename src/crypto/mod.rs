//! Symmetric primitives: the login payload cipher and public verification codes.

pub mod login_payload;
pub mod verification_code;

pub use login_payload::{CipherError, LoginPayloadCipher};
pub use verification_code::{VerificationCodeMinter, VerificationError};
