//! Application state shared by middleware and handlers.

use sqlx::PgPool;
use std::{fmt, sync::Arc};

use super::{
    context::TrustedProxies,
    handlers::{
        auth::storage::{PgSessionStore, PgUserStore, SessionStore, UserStore},
        verify::storage::{DocumentDirectory, PgDocumentDirectory},
    },
};
use crate::{
    audit::{AuditLedger, PgAuditSink},
    credentials::{BreachChecker, LockoutPolicy, TotpVerifier},
    crypto::{LoginPayloadCipher, VerificationCodeMinter},
    rate_limit::RateLimiter,
    session_token::TokenAuthority,
};

const DEFAULT_MFA_ISSUER: &str = "Pragma";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    mfa_issuer: String,
    lockout: LockoutPolicy,
    trusted_proxies: TrustedProxies,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            mfa_issuer: DEFAULT_MFA_ISSUER.to_string(),
            lockout: LockoutPolicy::default(),
            trusted_proxies: TrustedProxies::default(),
        }
    }

    #[must_use]
    pub fn with_mfa_issuer(mut self, issuer: String) -> Self {
        self.mfa_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_lockout_policy(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn mfa_issuer(&self) -> &str {
        &self.mfa_issuer
    }

    #[must_use]
    pub fn lockout(&self) -> LockoutPolicy {
        self.lockout
    }

    #[must_use]
    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted_proxies
    }
}

/// Key material parsed from configuration.
pub struct CryptoKeys {
    pub tokens: TokenAuthority,
    pub login_cipher: LoginPayloadCipher,
    pub verification: VerificationCodeMinter,
}

/// Persistence behind the handlers.
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentDirectory>,
    pub audit: AuditLedger,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            documents: Arc::new(PgDocumentDirectory::new(pool.clone())),
            audit: AuditLedger::new(Arc::new(PgAuditSink::new(pool.clone()))),
        }
    }
}

pub struct AppState {
    config: AuthConfig,
    keys: CryptoKeys,
    stores: Stores,
    rate_limiter: RateLimiter,
    breach: BreachChecker,
    totp: TotpVerifier,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        keys: CryptoKeys,
        stores: Stores,
        rate_limiter: RateLimiter,
        breach: BreachChecker,
    ) -> Self {
        let totp = TotpVerifier::new(config.mfa_issuer().to_string());
        Self {
            config,
            keys,
            stores,
            rate_limiter,
            breach,
            totp,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenAuthority {
        &self.keys.tokens
    }

    #[must_use]
    pub fn login_cipher(&self) -> &LoginPayloadCipher {
        &self.keys.login_cipher
    }

    #[must_use]
    pub fn verification(&self) -> &VerificationCodeMinter {
        &self.keys.verification
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn breach(&self) -> &BreachChecker {
        &self.breach
    }

    #[must_use]
    pub fn totp(&self) -> &TotpVerifier {
        &self.totp
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLedger {
        &self.stores.audit
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.stores.users.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.stores.sessions.as_ref()
    }

    #[must_use]
    pub fn documents(&self) -> &dyn DocumentDirectory {
        self.stores.documents.as_ref()
    }
}
