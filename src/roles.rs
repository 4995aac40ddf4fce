//! Closed set of platform roles.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use utoipa::ToSchema;

/// Token lifetime for staff roles, and the fallback for anything unrecognized.
pub const SHORT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Token lifetime for families (parents and students).
pub const LONG_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Parent,
    Student,
}

impl Role {
    pub const ALL: [Self; 5] = [
        Self::SuperAdmin,
        Self::Admin,
        Self::Teacher,
        Self::Parent,
        Self::Student,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
            Self::Student => "student",
        }
    }

    /// Staff roles must complete TOTP before a session unlocks protected routes.
    #[must_use]
    pub const fn requires_mfa(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin | Self::Teacher)
    }

    #[must_use]
    pub const fn token_ttl(self) -> Duration {
        match self {
            Self::SuperAdmin | Self::Admin | Self::Teacher => SHORT_TOKEN_TTL,
            Self::Parent | Self::Student => LONG_TOKEN_TTL,
        }
    }

    /// Only platform operators may act on a school other than their own.
    #[must_use]
    pub const fn may_override_tenant(self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_roles_require_mfa() {
        assert!(Role::SuperAdmin.requires_mfa());
        assert!(Role::Admin.requires_mfa());
        assert!(Role::Teacher.requires_mfa());
        assert!(!Role::Parent.requires_mfa());
        assert!(!Role::Student.requires_mfa());
    }

    #[test]
    fn token_ttl_depends_on_role() {
        assert_eq!(Role::Teacher.token_ttl(), Duration::from_secs(900));
        assert_eq!(Role::Student.token_ttl(), Duration::from_secs(86_400));
        assert_eq!(Role::Parent.token_ttl(), LONG_TOKEN_TTL);
        assert_eq!(Role::SuperAdmin.token_ttl(), SHORT_TOKEN_TTL);
    }

    #[test]
    fn role_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().ok(), Some(role));
        }
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin)?, "\"super_admin\"");
        let role: Role = serde_json::from_str("\"teacher\"")?;
        assert_eq!(role, Role::Teacher);
        Ok(())
    }
}
