use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Issued document as seen by the public verification page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub school_name: Option<String>,
    pub document_type: String,
    pub subject_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Document about to be handed to the renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDocument {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub document_type: String,
    pub verification_code: String,
    pub issued_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<DocumentRecord>>;

    async fn register(&self, document: &NewDocument) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct PgDocumentDirectory {
    pool: PgPool,
}

impl PgDocumentDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentDirectory for PgDocumentDirectory {
    async fn find_by_code(&self, code: &str) -> Result<Option<DocumentRecord>> {
        let query = r"
            SELECT d.id, d.school_id, s.name AS school_name, d.document_type,
                   d.subject_name, d.issued_at, d.expires_at
            FROM documents d
            LEFT JOIN schools s ON s.id = d.school_id
            WHERE d.verification_code = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up document by verification code")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DocumentRecord {
            id: row.try_get("id")?,
            tenant_id: row.try_get("school_id")?,
            school_name: row.try_get("school_name")?,
            document_type: row.try_get("document_type")?,
            subject_name: row.try_get("subject_name")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn register(&self, document: &NewDocument) -> Result<()> {
        let query = r"
            INSERT INTO documents
                (id, school_id, subject_id, document_type, subject_name,
                 verification_code, issued_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(document.id)
            .bind(document.tenant_id)
            .bind(document.subject_id)
            .bind(&document.document_type)
            .bind(&document.subject_name)
            .bind(&document.verification_code)
            .bind(document.issued_by)
            .bind(document.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to register document")?;
        Ok(())
    }
}
