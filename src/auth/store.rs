//! Durable persistence contracts for user and session records.
//!
//! The traits exist so the engines can be wired to Postgres in production
//! and to in-process fakes in tests. Refresh tokens are stored only as
//! SHA-256 hashes; raw values never touch a store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Account role. Admin may also be granted through the `"admin"` permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Moderator => "MODERATOR",
            Self::Admin => "ADMIN",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Self::User),
            "MODERATOR" => Some(Self::Moderator),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_premium: bool,
    pub role: Role,
    pub permissions: Vec<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// `is_verified` is derived: a user is verified exactly when
    /// `email_verified_at` is set.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.permissions.iter().any(|p| p == "admin")
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Outcome of a user insert; uniqueness conflicts are data, not errors.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(i64),
    EmailTaken,
    UsernameTaken,
}

/// Result of one atomic failed-login update.
#[derive(Clone, Copy, Debug)]
pub struct LoginFailure {
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; email and username are unique case-insensitively.
    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Lookup by normalized email or exact username.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>>;

    /// Set `email_verified_at = now`; idempotent.
    async fn mark_email_verified(&self, user_id: i64) -> Result<()>;

    /// Atomically bump the failed-login counter and, if it reaches
    /// `max_attempts`, set `locked_until = now + lockout` and reset the
    /// counter. Counter read and lockout decision happen in one update.
    async fn record_login_failure(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<LoginFailure>;

    /// Reset the failed-login counter and stamp `last_login_at`.
    async fn record_login_success(&self, user_id: i64) -> Result<()>;

    /// Replace the password hash and revoke every session of the user in a
    /// single transaction; no login may succeed with either hash in between.
    async fn rotate_password(&self, user_id: i64, password_hash: &str) -> Result<()>;

    /// Best-effort activity stamp; callers ignore failures.
    async fn touch_last_active(&self, user_id: i64) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
    pub refresh_token_hash: Vec<u8>,
    pub previous_refresh_token_hash: Option<Vec<u8>>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub device_fingerprint: String,
    pub ip_address: String,
}

impl SessionRecord {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: SessionRecord) -> Result<()>;

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Lookup by refresh-token hash, matching the current value or the
    /// immediately preceding one (kept for reuse detection).
    async fn find_by_refresh_hash(&self, refresh_hash: &[u8]) -> Result<Option<SessionRecord>>;

    /// Compare-and-swap rotation: succeeds only when the session is
    /// un-revoked, un-expired, and its current hash equals `current_hash`.
    /// On success the current hash moves to the previous slot and
    /// `next_hash` becomes current. Returns whether the swap happened.
    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        current_hash: &[u8],
        next_hash: &[u8],
    ) -> Result<bool>;

    async fn revoke(&self, session_id: &str) -> Result<()>;

    /// Revoke every session of the user; returns how many were live.
    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64>;
}
