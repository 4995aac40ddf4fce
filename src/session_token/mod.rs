//! Signed session tokens.
//!
//! Sessions are stateless Ed25519-signed compact JWS tokens. The lifetime depends on
//! the role: 15 minutes for staff, 24 hours for families. Staff tokens start with
//! `mfa_done = false` and are re-issued once TOTP succeeds.
//!
//! Session rows in the database only record a SHA-256 of each token so that logout
//! can remove them in bulk. Validation never consults those rows: a token stays
//! valid until it expires even after logout, which the short staff lifetime bounds.

mod error;
pub mod jwt;

pub use error::TokenError;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roles::Role;
use jwt::SessionClaims;

const SEED_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;

/// Authenticated caller as proven by a valid session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
    pub email: String,
    pub mfa_done: bool,
    pub issued_at: i64,
    pub not_before: i64,
    pub expires_at: i64,
}

impl Identity {
    /// Staff session that has not completed the second factor yet.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.role.requires_mfa() && !self.mfa_done
    }
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.uid,
            tenant_id: claims.sid,
            role: claims.role,
            email: claims.email,
            mfa_done: claims.mfa_done,
            issued_at: claims.iat,
            not_before: claims.nbf,
            expires_at: claims.exp,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age_seconds: i64,
}

pub struct TokenAuthority {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("verifying_key", &self.verifying_key)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// # Errors
    /// Returns an error if the public key is not the one derived from the private key.
    pub fn new(signing_key: SigningKey, verifying_key: VerifyingKey) -> Result<Self, TokenError> {
        if signing_key.verifying_key() != verifying_key {
            return Err(TokenError::KeyMismatch);
        }
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Load keys from standard base64.
    ///
    /// The private key may be the 32-byte seed or the 64-byte `seed || public` form.
    ///
    /// # Errors
    /// Returns an error if either key is malformed or the pair does not match.
    pub fn from_base64_keys(private_b64: &str, public_b64: &str) -> Result<Self, TokenError> {
        let private = Base64::decode_vec(private_b64.trim())
            .map_err(|_| TokenError::KeyParse("private key is not valid base64"))?;
        let seed: [u8; SEED_LEN] = match private.len() {
            SEED_LEN | KEYPAIR_LEN => private[..SEED_LEN]
                .try_into()
                .map_err(|_| TokenError::KeyParse("private key seed"))?,
            _ => return Err(TokenError::KeyParse("private key must be 32 or 64 bytes")),
        };
        let signing_key = SigningKey::from_bytes(&seed);

        let public = Base64::decode_vec(public_b64.trim())
            .map_err(|_| TokenError::KeyParse("public key is not valid base64"))?;
        let public: [u8; SEED_LEN] = public
            .as_slice()
            .try_into()
            .map_err(|_| TokenError::KeyParse("public key must be 32 bytes"))?;
        let verifying_key = VerifyingKey::from_bytes(&public)
            .map_err(|_| TokenError::KeyParse("public key is not a valid point"))?;

        if private.len() == KEYPAIR_LEN && private[SEED_LEN..] != public {
            return Err(TokenError::KeyMismatch);
        }

        Self::new(signing_key, verifying_key)
    }

    /// Issue a token for the user, valid from now for the role's lifetime.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        role: Role,
        email: &str,
        mfa_done: bool,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, tenant_id, role, email, mfa_done, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        role: Role,
        email: &str,
        mfa_done: bool,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(role.token_ttl()).map_err(|_| TokenError::Lifetime)?;
        let expires_at = now + ttl;
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            uid: user_id,
            sid: tenant_id,
            role,
            email: email.to_string(),
            mfa_done,
        };
        let token = jwt::sign(&self.signing_key, &claims)?;
        Ok(IssuedToken {
            token,
            expires_at,
            max_age_seconds: ttl.num_seconds(),
        })
    }

    /// Validate a presented token and return the identity it proves.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, forged, expired or not yet valid.
    pub fn validate(&self, token: &str) -> Result<Identity, TokenError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub(crate) fn validate_at(&self, token: &str, now: i64) -> Result<Identity, TokenError> {
        let claims = jwt::verify(token, &self.verifying_key)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if claims.nbf > now {
            return Err(TokenError::NotYetValid);
        }
        if claims.iat > now || claims.iat >= claims.exp {
            return Err(TokenError::IssuedInFuture);
        }
        if claims.sub != claims.uid.to_string() {
            return Err(TokenError::SubjectMismatch);
        }
        Ok(Identity::from(claims))
    }
}

/// Hex SHA-256 of a token, for session rows.
#[must_use]
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
