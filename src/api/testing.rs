//! In-memory application used by router tests.

use anyhow::Result;
use axum::{Router, body::to_bytes, response::Response};
use serde_json::Value;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use uuid::Uuid;

use super::{
    context::TrustedProxies,
    handlers::{
        auth::storage::{
            UserRecord,
            memory::{MemorySessionStore, MemoryUserStore},
        },
        verify::storage::memory::MemoryDocumentDirectory,
    },
    state::{AppState, AuthConfig, CryptoKeys, Stores},
};
use crate::{
    audit::{AuditEntry, AuditLedger, memory::MemoryAuditSink},
    credentials::{BreachChecker, LockState, hash_password},
    crypto::{LoginPayloadCipher, VerificationCodeMinter},
    rate_limit::{LimitsConfig, RateLimiter},
    roles::Role,
    session_token::tests::authority,
};

pub(crate) const LOGIN_KEY: [u8; 32] = [3u8; 32];
pub(crate) const FRONTEND: &str = "https://app.school.test";

/// Local reverse proxy the test app trusts for `X-Forwarded-For`.
pub(crate) const PROXY_IP: [u8; 4] = [127, 0, 0, 1];

/// Nothing listens on the discard port, so breach lookups fail open quickly.
const UNREACHABLE_BREACH_API: &str = "http://127.0.0.1:9";

pub(crate) struct TestApp {
    pub(crate) state: Arc<AppState>,
    pub(crate) users: Arc<MemoryUserStore>,
    pub(crate) sessions: Arc<MemorySessionStore>,
    pub(crate) documents: Arc<MemoryDocumentDirectory>,
    pub(crate) audit: Arc<MemoryAuditSink>,
}

#[derive(Default)]
pub(crate) struct TestAppBuilder {
    users: MemoryUserStore,
    limits: LimitsConfig,
    breach_api: Option<String>,
}

impl TestAppBuilder {
    pub(crate) fn user(mut self, record: UserRecord, mfa_secret: Option<String>) -> Self {
        self.users = self.users.with_user(record, mfa_secret);
        self
    }

    pub(crate) fn guardian(mut self, parent_id: Uuid, student_id: Uuid) -> Self {
        self.users = self.users.with_guardian(parent_id, student_id);
        self
    }

    pub(crate) fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub(crate) fn breach_api(mut self, url: String) -> Self {
        self.breach_api = Some(url);
        self
    }

    pub(crate) fn build(self) -> Result<TestApp> {
        let users = Arc::new(self.users);
        let sessions = Arc::new(MemorySessionStore::default());
        let documents = Arc::new(MemoryDocumentDirectory::default());
        let audit = Arc::new(MemoryAuditSink::default());

        let keys = CryptoKeys {
            tokens: authority(),
            login_cipher: LoginPayloadCipher::from_key(&LOGIN_KEY)?,
            verification: VerificationCodeMinter::new(b"verification-root-secret")?,
        };
        let stores = Stores {
            users: users.clone(),
            sessions: sessions.clone(),
            documents: documents.clone(),
            audit: AuditLedger::new(audit.clone()),
        };
        let breach = BreachChecker::new(
            self.breach_api
                .as_deref()
                .unwrap_or(UNREACHABLE_BREACH_API),
            Duration::from_millis(500),
        )?;
        let state = Arc::new(AppState::new(
            AuthConfig::new(FRONTEND.to_string())
                .with_trusted_proxies(TrustedProxies::new(vec![IpAddr::from(PROXY_IP)])),
            keys,
            stores,
            RateLimiter::new(&self.limits),
            breach,
        ));
        Ok(TestApp {
            state,
            users,
            sessions,
            documents,
            audit,
        })
    }
}

impl TestApp {
    pub(crate) fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub(crate) fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub(crate) fn router(&self) -> Router {
        super::router(&self.state)
    }

    pub(crate) fn token(&self, role: Role, tenant_id: Option<Uuid>, mfa_done: bool) -> Result<String> {
        let email = format!("{role}@school.test");
        Ok(self
            .state
            .tokens()
            .issue(Uuid::new_v4(), tenant_id, role, &email, mfa_done)?
            .token)
    }

    pub(crate) fn token_for(&self, user: &UserRecord, mfa_done: bool) -> Result<String> {
        Ok(self
            .state
            .tokens()
            .issue(user.id, user.tenant_id, user.role, &user.email, mfa_done)?
            .token)
    }

    /// Wait for detached audit writes to land.
    pub(crate) async fn audit_entries(&self, expected: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = self.audit.entries();
            if entries.len() >= expected {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.audit.entries()
    }
}

/// Active user with the given password hashed the production way.
pub(crate) fn user(role: Role, email: &str, password: &str) -> Result<UserRecord> {
    Ok(UserRecord {
        id: Uuid::new_v4(),
        tenant_id: (role != Role::SuperAdmin).then(Uuid::new_v4),
        role,
        email: email.to_string(),
        password_hash: hash_password(password)?,
        first_name: "Ana".to_string(),
        last_name: "Torres".to_string(),
        mfa_enabled: false,
        is_active: true,
        failed_login_attempts: 0,
        lock: LockState::Unlocked,
    })
}

/// Peer address of requests relayed by the trusted proxy.
pub(crate) fn proxy_peer() -> SocketAddr {
    (PROXY_IP, 48_080).into()
}

pub(crate) async fn body_json(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
