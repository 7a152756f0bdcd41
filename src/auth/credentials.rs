//! Registration, login, and password lifecycle.

use chrono::Utc;
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use std::time::Duration;

use super::config::AuthConfig;
use super::error::{AuthError, AuthResult};
use super::password::{dummy_digest, hash_password, validate_password, verify_password};
use super::rate_limit::RateLimiter;
use super::store::{CreateUserOutcome, NewUser, UserStore};
use super::tokens::{TokenEngine, TokenPair};
use super::utils::{normalize_email, valid_email};
use super::verification::{CodePurpose, VerificationEngine};

const USERNAME_DERIVE_ATTEMPTS: usize = 10;

#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug)]
pub struct RegisteredUser {
    pub user_id: i64,
    pub email: String,
    pub username: String,
}

pub struct CredentialEngine {
    config: Arc<AuthConfig>,
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenEngine>,
    verification: Arc<VerificationEngine>,
    limiter: RateLimiter,
    // Verified against when the identifier resolves to no user, so the
    // unknown-user path costs one Argon2 verification like the known one.
    timing_pad: String,
}

impl CredentialEngine {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenEngine>,
        verification: Arc<VerificationEngine>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            config,
            users,
            tokens,
            verification,
            limiter,
            timing_pad: dummy_digest(),
        }
    }

    /// Create an account and send the first verification code. No tokens are
    /// issued; the account starts unverified.
    pub async fn register(
        &self,
        registration: Registration,
        client_ip: Option<&str>,
    ) -> AuthResult<RegisteredUser> {
        if let Some(ip) = client_ip {
            self.limiter
                .check(
                    "register_ip",
                    ip,
                    self.config.register_ip_limit(),
                    Duration::from_secs(
                        u64::try_from(self.config.register_ip_window_seconds()).unwrap_or(600),
                    ),
                )
                .await?;
        }

        let email = normalize_email(&registration.email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        validate_password(&self.config, &registration.password)?;
        let password_hash = hash_password(&registration.password)?;

        // An empty or missing username means "derive one for me".
        let requested = registration
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let user_id = match requested {
            Some(username) => {
                self.create_once(&email, &username, &registration, &password_hash)
                    .await?
            }
            None => {
                self.create_with_derived_username(&email, &registration, &password_hash)
                    .await?
            }
        };

        self.verification
            .request_code(CodePurpose::EmailVerification, &email, None)
            .await?;

        Ok(RegisteredUser {
            user_id: user_id.0,
            email,
            username: user_id.1,
        })
    }

    async fn create_once(
        &self,
        email: &str,
        username: &str,
        registration: &Registration,
        password_hash: &str,
    ) -> AuthResult<(i64, String)> {
        match self
            .users
            .create(NewUser {
                email: email.to_string(),
                username: username.to_string(),
                first_name: registration.first_name.clone(),
                last_name: registration.last_name.clone(),
                password_hash: password_hash.to_string(),
            })
            .await?
        {
            CreateUserOutcome::Created(user_id) => Ok((user_id, username.to_string())),
            CreateUserOutcome::EmailTaken => Err(AuthError::EmailTaken),
            CreateUserOutcome::UsernameTaken => Err(AuthError::UsernameTaken),
        }
    }

    /// Derive a username from the email local part, appending a random
    /// suffix when the plain form is taken.
    async fn create_with_derived_username(
        &self,
        email: &str,
        registration: &Registration,
        password_hash: &str,
    ) -> AuthResult<(i64, String)> {
        let base = derive_username_base(email);
        for attempt in 0..USERNAME_DERIVE_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                let suffix: u32 = OsRng.gen_range(0..10_000);
                format!("{base}{suffix:04}")
            };
            match self
                .create_once(email, &candidate, registration, password_hash)
                .await
            {
                Ok(created) => return Ok(created),
                Err(AuthError::UsernameTaken) => {}
                Err(other) => return Err(other),
            }
        }
        Err(AuthError::Internal(anyhow::anyhow!(
            "could not derive a free username for {email}"
        )))
    }

    /// Authenticate by email or username.
    ///
    /// Unknown identifiers and wrong passwords are indistinguishable to the
    /// caller and take comparable time.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        device_fingerprint: &str,
        ip_address: &str,
    ) -> AuthResult<TokenPair> {
        if !ip_address.is_empty() {
            self.limiter
                .check(
                    "login_ip",
                    ip_address,
                    self.config.login_ip_limit(),
                    Duration::from_secs(
                        u64::try_from(self.config.login_ip_window_seconds()).unwrap_or(60),
                    ),
                )
                .await?;
        }

        let identifier = identifier.trim();
        let lookup = if identifier.contains('@') {
            normalize_email(identifier)
        } else {
            identifier.to_string()
        };
        let Some(user) = self.users.find_by_identifier(&lookup).await? else {
            let _ = verify_password(password, &self.timing_pad);
            return Err(AuthError::InvalidCredentials);
        };

        let now = Utc::now();
        if user.is_locked(now) {
            let retry_after_seconds = user
                .locked_until
                .map_or(1, |until| (until - now).num_seconds().max(1));
            return Err(AuthError::AccountLocked {
                retry_after_seconds,
            });
        }

        if !verify_password(password, &user.password_hash) {
            let failure = self
                .users
                .record_login_failure(
                    user.user_id,
                    self.config.max_login_attempts(),
                    Duration::from_secs(
                        u64::try_from(self.config.lockout_seconds()).unwrap_or(900),
                    ),
                )
                .await?;
            if failure.locked_until.is_some() {
                tracing::warn!(user_id = user.user_id, "account locked after repeated failures");
            }
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if self.config.require_email_verification_for_login() && !user.is_verified() {
            return Err(AuthError::EmailVerificationRequired);
        }

        self.users.record_login_success(user.user_id).await?;
        self.tokens
            .issue(user.user_id, device_fingerprint, ip_address)
            .await
    }

    /// Replace the password of an authenticated user. Every existing session
    /// is revoked and a fresh pair is issued for the caller.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
        device_fingerprint: &str,
        ip_address: &str,
    ) -> AuthResult<TokenPair> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(&self.config, new_password)?;
        let password_hash = hash_password(new_password)?;
        self.users.rotate_password(user_id, &password_hash).await?;
        self.tokens
            .issue(user_id, device_fingerprint, ip_address)
            .await
    }

    /// Complete a password reset with an emailed code. Consuming the code and
    /// rotating the password revokes every session; no tokens are issued.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        // Policy first so a weak password does not burn the code.
        validate_password(&self.config, new_password)?;
        let email = normalize_email(email);
        self.verification
            .check_code(CodePurpose::PasswordReset, &email, code)
            .await?;
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::CodeExpired)?;
        let password_hash = hash_password(new_password)?;
        self.users
            .rotate_password(user.user_id, &password_hash)
            .await?;
        Ok(())
    }

    /// End one session. Idempotent.
    pub async fn logout(&self, session_id: &str) -> AuthResult<()> {
        self.tokens.revoke_session(session_id).await
    }
}

fn derive_username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_lowercase();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}
