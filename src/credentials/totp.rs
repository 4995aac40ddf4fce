//! TOTP second factor (RFC 6238: SHA-1, 6 digits, 30 s step, one step of skew).

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

#[derive(Clone, Debug)]
pub struct TotpVerifier {
    issuer: String,
}

impl TotpVerifier {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    fn totp(&self, secret_base32: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.trim().to_string())
            .to_bytes()
            .map_err(|e| anyhow!("TOTP secret decode error: {e:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            "user".to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }

    /// Check `code` against the base32 secret stored for the user.
    ///
    /// # Errors
    /// Returns an error if the stored secret is not valid base32 or too short.
    pub fn verify(&self, secret_base32: &str, code: &str) -> Result<bool> {
        let code = code.trim();
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        let totp = self.totp(secret_base32)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }
}
