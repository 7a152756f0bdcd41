//! In-process store implementing both persistence contracts.
//!
//! Used by the test suite and for local development without Postgres. One
//! mutex guards users and sessions together, which makes the combined
//! operations (`rotate_password`, `rotate_refresh_hash`) atomic the same way
//! the Postgres transactions are.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::store::{
    CreateUserOutcome, LoginFailure, NewUser, Role, SessionRecord, SessionStore, UserRecord,
    UserStore,
};

#[derive(Default)]
struct State {
    users: HashMap<i64, UserRecord>,
    sessions: HashMap<String, SessionRecord>,
    next_user_id: i64,
}

#[derive(Default)]
pub struct MemoryAuthStore {
    state: Mutex<State>,
}

impl MemoryAuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryAuthStore {
    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == new_user.email) {
            return Ok(CreateUserOutcome::EmailTaken);
        }
        // Same uniqueness rule as the LOWER(username) index in Postgres.
        if state
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&new_user.username))
        {
            return Ok(CreateUserOutcome::UsernameTaken);
        }
        state.next_user_id += 1;
        let user_id = state.next_user_id;
        state.users.insert(
            user_id,
            UserRecord {
                user_id,
                email: new_user.email,
                username: new_user.username,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                password_hash: new_user.password_hash,
                is_active: true,
                is_premium: false,
                role: Role::User,
                permissions: Vec::new(),
                email_verified_at: None,
                failed_login_count: 0,
                locked_until: None,
                last_login_at: None,
                last_active_at: None,
                created_at: Utc::now(),
            },
        );
        Ok(CreateUserOutcome::Created(user_id))
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email == identifier || u.username.eq_ignore_ascii_case(identifier))
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            if user.email_verified_at.is_none() {
                user.email_verified_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<LoginFailure> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(LoginFailure {
                failed_login_count: 0,
                locked_until: None,
            });
        };
        user.failed_login_count += 1;
        let mut locked_until = None;
        if user.failed_login_count >= i32::try_from(max_attempts).unwrap_or(i32::MAX) {
            let until = Utc::now()
                + ChronoDuration::seconds(i64::try_from(lockout.as_secs()).unwrap_or(i64::MAX));
            user.locked_until = Some(until);
            user.failed_login_count = 0;
            locked_until = Some(until);
        }
        Ok(LoginFailure {
            failed_login_count: user.failed_login_count,
            locked_until,
        })
    }

    async fn record_login_success(&self, user_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.failed_login_count = 0;
            user.locked_until = None;
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn rotate_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        // Both writes happen under the same lock; nothing can observe the
        // new hash with old sessions still live.
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        for session in state.sessions.values_mut() {
            if session.user_id == user_id {
                session.revoked = true;
            }
        }
        Ok(())
    }

    async fn touch_last_active(&self, user_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.last_active_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryAuthStore {
    async fn insert(&self, session: SessionRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(session_id).cloned())
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &[u8]) -> Result<Option<SessionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|s| {
                s.refresh_token_hash == refresh_hash
                    || s.previous_refresh_token_hash.as_deref() == Some(refresh_hash)
            })
            .cloned())
    }

    async fn rotate_refresh_hash(
        &self,
        session_id: &str,
        current_hash: &[u8],
        next_hash: &[u8],
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let Some(session) = state.sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if !session.is_live(now) || session.refresh_token_hash != current_hash {
            return Ok(false);
        }
        session.previous_refresh_token_hash = Some(session.refresh_token_hash.clone());
        session.refresh_token_hash = next_hash.to_vec();
        Ok(true)
    }

    async fn revoke(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for session in state.sessions.values_mut() {
            if session.user_id == user_id {
                if session.is_live(now) {
                    revoked += 1;
                }
                session.revoked = true;
            }
        }
        Ok(revoked)
    }
}
