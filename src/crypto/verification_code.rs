//! Public verification codes for issued documents and ID cards.
//!
//! A code is `base64url(HMAC-SHA256(tenant_key, "<subject>:<tenant>"))`, where the
//! tenant key is itself `HMAC-SHA256(root_secret, "verification:<tenant>")`. Codes are
//! stateless, so anyone holding one can have it checked without a lookup table of
//! secrets, and a code minted for one school never verifies under another.

use base64ct::{Base64Url, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification secret must not be empty")]
    EmptySecret,
    #[error("invalid MAC key length")]
    KeyLength,
}

fn keyed(key: &[u8]) -> Result<HmacSha256, VerificationError> {
    HmacSha256::new_from_slice(key).map_err(|_| VerificationError::KeyLength)
}

pub struct VerificationCodeMinter {
    root_secret: SecretSlice<u8>,
}

impl fmt::Debug for VerificationCodeMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationCodeMinter")
            .finish_non_exhaustive()
    }
}

impl VerificationCodeMinter {
    /// # Errors
    /// Returns an error if the root secret is empty.
    pub fn new(root_secret: &[u8]) -> Result<Self, VerificationError> {
        if root_secret.is_empty() {
            return Err(VerificationError::EmptySecret);
        }
        Ok(Self {
            root_secret: SecretSlice::from(root_secret.to_vec()),
        })
    }

    fn tenant_key(&self, tenant_id: Uuid) -> Result<[u8; 32], VerificationError> {
        let mut mac = keyed(self.root_secret.expose_secret())?;
        mac.update(b"verification:");
        mac.update(tenant_id.to_string().as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&mac.finalize().into_bytes());
        Ok(key)
    }

    /// Mint the code printed on a document or card.
    ///
    /// # Errors
    /// Returns an error only if the MAC cannot be keyed.
    pub fn generate_code(
        &self,
        subject_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<String, VerificationError> {
        let mut mac = keyed(&self.tenant_key(tenant_id)?)?;
        mac.update(format!("{subject_id}:{tenant_id}").as_bytes());
        Ok(Base64Url::encode_string(&mac.finalize().into_bytes()))
    }

    /// Constant-time check of `code` against the one minted for `(subject, tenant)`.
    #[must_use]
    pub fn verify_code(&self, code: &str, subject_id: Uuid, tenant_id: Uuid) -> bool {
        self.generate_code(subject_id, tenant_id)
            .is_ok_and(|expected| bool::from(code.as_bytes().ct_eq(expected.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> Result<VerificationCodeMinter, VerificationError> {
        VerificationCodeMinter::new(b"root verification secret")
    }

    #[test]
    fn code_verifies_for_its_own_tenant() -> Result<(), VerificationError> {
        let minter = minter()?;
        let subject = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let code = minter.generate_code(subject, tenant)?;
        assert!(minter.verify_code(&code, subject, tenant));
        // Deterministic for the same inputs.
        assert_eq!(code, minter.generate_code(subject, tenant)?);
        Ok(())
    }

    #[test]
    fn code_from_another_tenant_is_rejected() -> Result<(), VerificationError> {
        let minter = minter()?;
        let subject = Uuid::new_v4();
        let school_a = Uuid::new_v4();
        let school_b = Uuid::new_v4();
        let code = minter.generate_code(subject, school_a)?;
        assert!(!minter.verify_code(&code, subject, school_b));
        assert_ne!(code, minter.generate_code(subject, school_b)?);
        Ok(())
    }

    #[test]
    fn code_for_another_subject_is_rejected() -> Result<(), VerificationError> {
        let minter = minter()?;
        let tenant = Uuid::new_v4();
        let code = minter.generate_code(Uuid::new_v4(), tenant)?;
        assert!(!minter.verify_code(&code, Uuid::new_v4(), tenant));
        Ok(())
    }

    #[test]
    fn tenants_get_distinct_keys() -> Result<(), VerificationError> {
        let minter = minter()?;
        assert_ne!(
            minter.tenant_key(Uuid::new_v4())?,
            minter.tenant_key(Uuid::new_v4())?
        );
        Ok(())
    }

    #[test]
    fn different_root_secret_rejects() -> Result<(), VerificationError> {
        let subject = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let code = minter()?.generate_code(subject, tenant)?;
        let other = VerificationCodeMinter::new(b"another root secret")?;
        assert!(!other.verify_code(&code, subject, tenant));
        Ok(())
    }

    #[test]
    fn code_is_url_safe() -> Result<(), VerificationError> {
        let code = minter()?.generate_code(Uuid::new_v4(), Uuid::new_v4())?;
        assert!(
            code.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
        );
        assert!(!minter()?.verify_code("", Uuid::new_v4(), Uuid::new_v4()));
        Ok(())
    }

    #[test]
    fn empty_root_secret_is_rejected() {
        assert!(VerificationCodeMinter::new(b"").is_err());
    }
}
