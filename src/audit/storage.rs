use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use tracing::Instrument;

use super::{AuditEntry, AuditSink};

/// Writes audit entries to the `audit_logs` table. Rows are never updated or deleted.
#[derive(Clone, Debug)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let query = r"
            INSERT INTO audit_logs
                (school_id, user_id, action, entity_type, entity_id,
                 old_value, new_value, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(entry.tenant_id)
            .bind(entry.user_id)
            .bind(&entry.action)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(entry.old_value.as_ref().map(Json))
            .bind(entry.new_value.as_ref().map(Json))
            .bind(entry.ip_address.as_deref())
            .bind(entry.user_agent.as_deref())
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert audit entry")?;
        Ok(())
    }
}
