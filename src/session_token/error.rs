use thiserror::Error;

/// Why a token was rejected. Callers at the HTTP boundary collapse every variant
/// into a single `unauthorized`; the detail is for logs only.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unsupported token type: {0}")]
    UnsupportedType(String),
    #[error("failed to parse key: {0}")]
    KeyParse(&'static str),
    #[error("public key does not match private key")]
    KeyMismatch,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("subject does not match user id")]
    SubjectMismatch,
    #[error("token lifetime out of range")]
    Lifetime,
}
