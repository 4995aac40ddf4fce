//! Compact JWS encoding with `EdDSA` signatures.

use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TokenError;
use crate::roles::Role;

pub const ALG: &str = "EdDSA";
pub const TYP: &str = "JWT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn eddsa() -> Self {
        Self {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub uid: Uuid,
    /// School the session belongs to; absent for platform operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
    pub role: Role,
    pub email: String,
    pub mfa_done: bool,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Sign `claims` into `header.payload.signature`.
///
/// # Errors
/// Returns an error if the header or claims cannot be encoded.
pub fn sign(signing_key: &SigningKey, claims: &SessionClaims) -> Result<String, TokenError> {
    let header_b64 = b64e_json(&SessionTokenHeader::eddsa())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_bytes());
    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Check structure, header and signature, then decode the claims.
///
/// Time-based validation is left to the caller.
///
/// # Errors
/// Returns an error if the token is malformed, names another algorithm or type,
/// or the signature does not verify.
pub fn verify(token: &str, verifying_key: &VerifyingKey) -> Result<SessionClaims, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
    if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
        return Err(TokenError::TokenFormat);
    }

    // The algorithm is pinned; whatever the header claims, only EdDSA is accepted.
    let header: SessionTokenHeader = b64d_json(header_b64)?;
    if header.alg != ALG {
        return Err(TokenError::UnsupportedAlg(header.alg));
    }
    if header.typ != TYP {
        return Err(TokenError::UnsupportedType(header.typ));
    }

    let signature_bytes =
        Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| TokenError::InvalidSignature)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    verifying_key
        .verify_strict(signing_input.as_bytes(), &signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    b64d_json(claims_b64)
}
