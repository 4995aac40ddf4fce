//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRecord;
use crate::roles::Role;

/// Login body; `encrypted` is `base64(nonce || ciphertext || tag)` of the credentials JSON.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct EncryptedLoginRequest {
    pub encrypted: String,
}

/// Plaintext inside the encrypted login payload.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoginCredentials {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub school_id: Option<Uuid>,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            school_id: user.tenant_id,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum LoginResponse {
    /// Staff session issued without the second factor; call `/v1/auth/mfa/verify` next.
    MfaPending { mfa_required: bool, user_id: Uuid },
    Authenticated { user: UserSummary },
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct MfaVerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MfaVerifyResponse {
    pub ok: bool,
}

#[derive(ToSchema, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub school_id: Uuid,
    pub role: Role,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub public_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct PasswordResetRequest {
    pub email: String,
}
