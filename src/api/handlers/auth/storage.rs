//! Storage seam for users and sessions.
//!
//! Handlers talk to [`UserStore`] and [`SessionStore`]; Postgres implementations
//! live here, and tests swap in the in-memory fakes from [`memory`].

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::utils::unique_violation_constraint;
use crate::{
    credentials::{FailedLogin, LockState, LockoutPolicy},
    roles::Role,
};

const USER_COLUMNS: &str = "id, school_id, role, email, password_hash, first_name, last_name, \
     mfa_enabled, is_active, failed_login_attempts, locked_until, locked_indefinitely";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub mfa_enabled: bool,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub lock: LockState,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub tenant_id: Uuid,
    pub public_id: String,
    pub role: Role,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(Uuid),
    EmailTaken,
    PublicIdTaken,
}

/// One row per issued token, kept only so logout can remove them in bulk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>>;

    /// Count one more failure and apply `policy` in a single atomic step, so
    /// concurrent attempts never overwrite each other. `None` if the user is gone.
    async fn record_failed_login(
        &self,
        user_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<FailedLogin>>;

    /// Reset the failure counter and stamp `last_login_at`.
    async fn record_successful_login(&self, user_id: Uuid) -> Result<()>;

    /// Operator reset of the failure counter and any lock.
    async fn clear_lockout(&self, user_id: Uuid) -> Result<()>;

    /// Base32 TOTP secret, if the user has enrolled.
    async fn mfa_secret(&self, user_id: Uuid) -> Result<Option<String>>;

    /// Whether the parent is linked to the student and may request their documents.
    async fn is_guardian_of(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool>;

    async fn insert_user(&self, user: &NewUser) -> Result<InsertOutcome>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &SessionRecord) -> Result<()>;

    /// Remove every session row for the user; returns how many were removed.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64>;
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|err| anyhow!("user row carries {err}"))?;
    Ok(UserRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("school_id")?,
        role,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        is_active: row.try_get("is_active")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        lock: LockState::from_columns(
            row.try_get("locked_until")?,
            row.try_get("locked_indefinitely")?,
        ),
    })
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, query: &str, bind: UserKey<'_>) -> Result<Option<UserRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let statement = sqlx::query(query);
        let statement = match bind {
            UserKey::Email(email) => statement.bind(email),
            UserKey::Id(id) => statement.bind(id),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn reset_counters(&self, user_id: Uuid, stamp_login: bool) -> Result<()> {
        let query = r"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                locked_indefinitely = FALSE,
                last_login_at = CASE WHEN $2 THEN NOW() ELSE last_login_at END,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(stamp_login)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset login counters")?;
        Ok(())
    }
}

enum UserKey<'a> {
    Email(&'a str),
    Id(Uuid),
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
        self.find_one(&query, UserKey::Email(email)).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.find_one(&query, UserKey::Id(user_id)).await
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<FailedLogin>> {
        // SET expressions see the row as it was before this UPDATE.
        let query = r"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN NULL
                    WHEN failed_login_attempts + 1 >= $3 THEN $4::TIMESTAMPTZ
                    ELSE NULL
                END,
                locked_indefinitely = locked_indefinitely OR failed_login_attempts + 1 >= $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until, locked_indefinitely
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(policy.indefinite_threshold())
            .bind(policy.timed_threshold())
            .bind(now + policy.timed_duration())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to record failed login")?;

        row.map(|row| -> Result<FailedLogin> {
            Ok(FailedLogin {
                attempts: row.try_get("failed_login_attempts")?,
                lock: LockState::from_columns(
                    row.try_get("locked_until")?,
                    row.try_get("locked_indefinitely")?,
                ),
            })
        })
        .transpose()
    }

    async fn record_successful_login(&self, user_id: Uuid) -> Result<()> {
        self.reset_counters(user_id, true).await
    }

    async fn clear_lockout(&self, user_id: Uuid) -> Result<()> {
        self.reset_counters(user_id, false).await
    }

    async fn mfa_secret(&self, user_id: Uuid) -> Result<Option<String>> {
        let query = "SELECT mfa_secret FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let secret: Option<Option<String>> = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load MFA secret")?;
        Ok(secret.flatten().filter(|secret| !secret.is_empty()))
    }

    async fn is_guardian_of(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM parent_students
                WHERE parent_id = $1 AND student_id = $2 AND can_generate_docs
            )
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_scalar(query)
            .bind(parent_id)
            .bind(student_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up guardian link")
    }

    async fn insert_user(&self, user: &NewUser) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO users
                (school_id, public_id, role, email, password_hash, first_name, last_name, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.tenant_id)
            .bind(&user.public_id)
            .bind(user.role.as_str())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.phone.as_deref())
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Created(row.try_get("id")?)),
            Err(err) => match unique_violation_constraint(&err) {
                Some(constraint) if constraint.contains("public_id") => {
                    Ok(InsertOutcome::PublicIdTaken)
                }
                Some(_) => Ok(InsertOutcome::EmailTaken),
                None => Err(err).context("failed to insert user"),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &SessionRecord) -> Result<()> {
        let query = r"
            INSERT INTO sessions
                (user_id, school_id, token_hash, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.user_id)
            .bind(session.tenant_id)
            .bind(&session.token_hash)
            .bind(session.ip_address.as_deref())
            .bind(session.user_agent.as_deref())
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete sessions")?;
        Ok(result.rows_affected())
    }
}
