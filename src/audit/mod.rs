//! Append-only audit ledger.
//!
//! Entries are written by a catch-all middleware for every mutating request that
//! carries an identity, and explicitly by handlers that want old/new snapshots.
//! Failures to write are logged and never surface to the client.

mod storage;

pub use storage::PgAuditSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{Instrument, error, info_span};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// Dot-namespaced, e.g. `user.register` or `post./v1/grades`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    #[must_use]
    pub fn with_actor(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    #[must_use]
    pub fn with_old_value(mut self, value: Value) -> Self {
        self.old_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_new_value(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct AuditLedger {
    sink: Arc<dyn AuditSink>,
}

impl fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLedger").finish_non_exhaustive()
    }
}

impl AuditLedger {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append one entry. Errors are logged and swallowed.
    pub async fn write(&self, entry: AuditEntry) {
        let span = info_span!("audit.write", audit.action = %entry.action);
        if let Err(err) = self.sink.append(&entry).instrument(span).await {
            error!(
                action = %entry.action,
                entity_type = %entry.entity_type,
                "Failed to write audit entry: {err:#}"
            );
        }
    }

    /// Write on a detached task so a dropped request future cannot lose the entry.
    pub fn spawn_write(&self, entry: AuditEntry) -> tokio::task::JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move { ledger.write(entry).await })
    }
}
