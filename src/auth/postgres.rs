//! Postgres-backed implementation of the user and session contracts.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tracing::Instrument;

use super::store::{
    CreateUserOutcome, LoginFailure, NewUser, Role, SessionRecord, SessionStore, UserRecord,
    UserStore,
};

const USER_COLUMNS: &str = r"
    user_id, email, username, first_name, last_name, password_hash,
    is_active, is_premium, role, permissions, email_verified_at,
    failed_login_count, locked_until, last_login_at, last_active_at, created_at
";

/// One pool, both contracts. Operations that must be atomic across users and
/// sessions (`rotate_password`) run in a single transaction.
#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => db_err
            .constraint()
            .map(str::to_string)
            .or_else(|| Some(String::new())),
        _ => None,
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role value: {role}"))?;
    Ok(UserRecord {
        user_id: row.get("user_id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_premium: row.get("is_premium"),
        role,
        permissions: row.get("permissions"),
        email_verified_at: row.get("email_verified_at"),
        failed_login_count: row.get("failed_login_count"),
        locked_until: row.get("locked_until"),
        last_login_at: row.get("last_login_at"),
        last_active_at: row.get("last_active_at"),
        created_at: row.get("created_at"),
    })
}

fn session_from_row(row: &PgRow) -> SessionRecord {
    SessionRecord {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        refresh_token_hash: row.get("refresh_token_hash"),
        previous_refresh_token_hash: row.get("previous_refresh_token_hash"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked: row.get("revoked"),
        device_fingerprint: row.get("device_fingerprint"),
        ip_address: row.get("ip_address"),
    }
}

#[async_trait]
impl UserStore for PgAuthStore {
    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(&new_user.email)
            .bind(&new_user.username)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(CreateUserOutcome::Created(row.get("user_id"))),
            Err(err) => match unique_violation_constraint(&err) {
                Some(constraint) if constraint.contains("username") => {
                    Ok(CreateUserOutcome::UsernameTaken)
                }
                Some(_) => Ok(CreateUserOutcome::EmailTaken),
                None => Err(err).context("failed to insert user"),
            },
        }
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let query = &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>> {
        // Username uniqueness is on LOWER(username), so lookup matches it.
        let query = &format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR LOWER(username) = LOWER($1) LIMIT 1"
        );
        let row = sqlx::query(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user by identifier")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn mark_email_verified(&self, user_id: i64) -> Result<()> {
        let query = r"
            UPDATE users
            SET email_verified_at = NOW()
            WHERE user_id = $1 AND email_verified_at IS NULL
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to mark email verified")?;
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<LoginFailure> {
        // Counter bump and lockout decision in one statement so parallel
        // failures cannot race past the threshold.
        let query = r"
            UPDATE users
            SET locked_until = CASE
                    WHEN failed_login_count + 1 >= $2
                    THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE locked_until
                END,
                failed_login_count = CASE
                    WHEN failed_login_count + 1 >= $2 THEN 0
                    ELSE failed_login_count + 1
                END
            WHERE user_id = $1
            RETURNING failed_login_count, locked_until
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(i64::from(max_attempts))
            .bind(i64::try_from(lockout.as_secs()).unwrap_or(i64::MAX))
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to record login failure")?;

        let Some(row) = row else {
            return Ok(LoginFailure {
                failed_login_count: 0,
                locked_until: None,
            });
        };
        let failed_login_count: i32 = row.get("failed_login_count");
        let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
        let now = Utc::now();
        Ok(LoginFailure {
            failed_login_count,
            locked_until: if failed_login_count == 0 {
                locked_until.filter(|until| *until > now)
            } else {
                None
            },
        })
    }

    async fn record_login_success(&self, user_id: i64) -> Result<()> {
        let query = r"
            UPDATE users
            SET failed_login_count = 0,
                locked_until = NULL,
                last_login_at = NOW()
            WHERE user_id = $1
        ";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    async fn rotate_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin password rotation transaction")?;

        let query = "UPDATE users SET password_hash = $2 WHERE user_id = $1";
        sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;

        let query = "UPDATE auth_sessions SET revoked = TRUE WHERE user_id = $1";
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke sessions for password rotation")?;

        tx.commit()
            .await
            .context("failed to commit password rotation")?;
        Ok(())
    }

    async fn touch_last_active(&self, user_id: i64) -> Result<()> {
        let query = "UPDATE users SET last_active_at = NOW() WHERE user_id = $1";
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to touch last_active_at")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgAuthStore {
    async fn insert(&self, session: SessionRecord) -> Result<()> {
        let query = r"
            INSERT INTO auth_sessions
                (session_id, user_id, refresh_token_hash, previous_refresh_token_hash,
                 issued_at, expires_at, revoked, device_fingerprint, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        sqlx::query(query)
            .bind(&session.session_id)
            .bind(session.user_id)
            .bind(&session.refresh_token_hash)
            .bind(&session.previous_refresh_token_hash)
            .bind(session.issued_at)
            .bind(session.expires_at)
            .bind(session.revoked)
            .bind(&session.device_fingerprint)
            .bind(&session.ip_address)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let query = "SELECT * FROM auth_sessions WHERE session_id = $1";
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT * FROM auth_sessions
            WHERE refresh_token_hash = $1 OR previous_refresh_token_hash = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(refresh_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session by refresh hash")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        current_hash: &[u8],
        next_hash: &[u8],
    ) -> Result<bool> {
        // Compare-and-swap: at most one concurrent refresh wins.
        let query = r"
            UPDATE auth_sessions
            SET previous_refresh_token_hash = refresh_token_hash,
                refresh_token_hash = $3
            WHERE session_id = $1
              AND refresh_token_hash = $2
              AND NOT revoked
              AND expires_at > NOW()
        ";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(current_hash)
            .bind(next_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to rotate refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, session_id: &str) -> Result<()> {
        let query = "UPDATE auth_sessions SET revoked = TRUE WHERE session_id = $1";
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64> {
        let query = r"
            UPDATE auth_sessions
            SET revoked = TRUE
            WHERE user_id = $1 AND NOT revoked AND expires_at > NOW()
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke sessions for user")?;
        Ok(result.rows_affected())
    }
}
