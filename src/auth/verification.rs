//! Email-code verification engine.
//!
//! One live code per (purpose, email). Codes expire with their key-value
//! entry, burn out after too many wrong guesses, and are deleted on success.
//! Whether an email is registered is never observable from this surface.

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::config::AuthConfig;
use super::email::EmailSender;
use super::error::{AuthError, AuthResult};
use super::kv::KeyValueStore;
use super::rate_limit::RateLimiter;
use super::store::UserStore;
use super::utils::{constant_time_eq, generate_code, normalize_email, valid_email};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
}

impl CodePurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }

    fn subject(self) -> &'static str {
        match self {
            Self::EmailVerification => "Verify your ReviewInn email",
            Self::PasswordReset => "Reset your ReviewInn password",
        }
    }

    fn body(self, code: &str, ttl_minutes: i64) -> String {
        match self {
            Self::EmailVerification => format!(
                "Your ReviewInn verification code is {code}. \
                 It expires in {ttl_minutes} minutes."
            ),
            Self::PasswordReset => format!(
                "Your ReviewInn password reset code is {code}. \
                 It expires in {ttl_minutes} minutes. \
                 If you did not request this, you can ignore this message."
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CodeEntry {
    code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub struct VerificationEngine {
    config: Arc<AuthConfig>,
    kv: Arc<dyn KeyValueStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn EmailSender>,
    limiter: RateLimiter,
}

fn code_key(purpose: CodePurpose, email: &str) -> String {
    format!("code:{}:{email}", purpose.as_str())
}

fn attempts_key(purpose: CodePurpose, email: &str) -> String {
    format!("code:{}:{email}:attempts", purpose.as_str())
}

fn cooldown_key(purpose: CodePurpose, email: &str) -> String {
    format!("cooldown:{}:{email}", purpose.as_str())
}

impl VerificationEngine {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        kv: Arc<dyn KeyValueStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let limiter = RateLimiter::new(Arc::clone(&kv));
        Self {
            config,
            kv,
            users,
            mailer,
            limiter,
        }
    }

    /// Generate and send a fresh code, replacing any live one.
    ///
    /// The response is identical whether or not the email is registered; the
    /// cooldown marker is written either way so RESEND_TOO_SOON cannot be
    /// used as an existence oracle.
    pub async fn request_code(
        &self,
        purpose: CodePurpose,
        email: &str,
        client_ip: Option<&str>,
    ) -> AuthResult<()> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if let Some(ip) = client_ip {
            self.limiter
                .check(
                    "code_send_ip",
                    ip,
                    self.config.code_send_ip_limit(),
                    Duration::from_secs(
                        u64::try_from(self.config.code_send_ip_window_seconds()).unwrap_or(60),
                    ),
                )
                .await?;
        }

        let cooldown = cooldown_key(purpose, &email);
        if let Some(remaining) = self.kv.ttl(&cooldown).await.map_err(AuthError::Unavailable)? {
            return Err(AuthError::ResendTooSoon {
                retry_after_seconds: i64::try_from(remaining.as_secs().max(1)).unwrap_or(i64::MAX),
            });
        }
        self.kv
            .set(
                &cooldown,
                b"1",
                Duration::from_secs(
                    u64::try_from(self.config.resend_cooldown_seconds()).unwrap_or(120),
                ),
            )
            .await
            .map_err(AuthError::Unavailable)?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };
        if purpose == CodePurpose::EmailVerification && user.is_verified() {
            return Ok(());
        }

        let code = generate_code();
        let now = Utc::now();
        let ttl_seconds = self.config.code_ttl_seconds();
        let entry = CodeEntry {
            code: code.clone(),
            issued_at: now,
            expires_at: now + ChronoDuration::seconds(ttl_seconds),
        };
        let payload = serde_json::to_vec(&entry).context("serializing code entry")?;
        self.kv
            .set(
                &code_key(purpose, &email),
                &payload,
                Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(900)),
            )
            .await
            .map_err(AuthError::Unavailable)?;
        self.kv
            .del(&attempts_key(purpose, &email))
            .await
            .map_err(AuthError::Unavailable)?;

        self.send_with_retry(purpose, &email, &code, ttl_seconds / 60)
            .await
    }

    async fn send_with_retry(
        &self,
        purpose: CodePurpose,
        email: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> AuthResult<()> {
        let subject = purpose.subject();
        let body = purpose.body(code, ttl_minutes);
        for attempt in 1..=2 {
            match self.mailer.send(email, subject, &body).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::error!(%err, attempt, purpose = purpose.as_str(), "email send failed");
                }
            }
        }
        Err(AuthError::EmailSendFailed)
    }

    /// Check a submitted code against the live one, consuming it on success.
    ///
    /// Attempts are counted atomically on a sibling key, so parallel guesses
    /// cannot exceed the attempt budget.
    pub async fn check_code(
        &self,
        purpose: CodePurpose,
        email: &str,
        submitted: &str,
    ) -> AuthResult<()> {
        let email = normalize_email(email);
        let key = code_key(purpose, &email);
        let attempts = attempts_key(purpose, &email);

        let Some(raw) = self.kv.get(&key).await.map_err(AuthError::Unavailable)? else {
            self.kv.del(&attempts).await.map_err(AuthError::Unavailable)?;
            return Err(AuthError::CodeExpired);
        };
        let entry: CodeEntry =
            serde_json::from_slice(&raw).context("deserializing code entry")?;

        let max = i64::from(self.config.max_code_attempts());
        let count = self
            .kv
            .incr(
                &attempts,
                Duration::from_secs(
                    u64::try_from(self.config.code_ttl_seconds()).unwrap_or(900),
                ),
            )
            .await
            .map_err(AuthError::Unavailable)?;
        if count > max {
            self.burn(&key, &attempts).await?;
            return Err(AuthError::CodeExhausted);
        }

        if !constant_time_eq(submitted, &entry.code) {
            if count == max {
                self.burn(&key, &attempts).await?;
                return Err(AuthError::CodeExhausted);
            }
            let attempts_remaining = u32::try_from(max - count).unwrap_or(0);
            return Err(AuthError::CodeInvalid { attempts_remaining });
        }

        self.burn(&key, &attempts).await?;
        Ok(())
    }

    async fn burn(&self, key: &str, attempts: &str) -> AuthResult<()> {
        self.kv.del(key).await.map_err(AuthError::Unavailable)?;
        self.kv.del(attempts).await.map_err(AuthError::Unavailable)?;
        Ok(())
    }

    /// Consume an email-verification code and flip the account to verified.
    pub async fn verify_email(&self, email: &str, submitted: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        self.check_code(CodePurpose::EmailVerification, &email, submitted)
            .await?;
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::CodeExpired)?;
        self.users.mark_email_verified(user.user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::email::testing::RecordingEmailSender;
    use crate::auth::memory::MemoryAuthStore;
    use crate::auth::store::{CreateUserOutcome, NewUser};

    struct Fixture {
        engine: VerificationEngine,
        users: Arc<MemoryAuthStore>,
        mailer: Arc<RecordingEmailSender>,
        kv: Arc<crate::auth::kv::MemoryKvStore>,
    }

    async fn fixture() -> Fixture {
        fixture_with(AuthConfig::new(secrecy::SecretString::from(
            "unit-test-secret".to_string(),
        )))
        .await
    }

    async fn fixture_with(config: AuthConfig) -> Fixture {
        let users = Arc::new(MemoryAuthStore::new());
        let kv = Arc::new(crate::auth::kv::MemoryKvStore::new());
        let mailer = Arc::new(RecordingEmailSender::default());
        let engine = VerificationEngine::new(
            Arc::new(config),
            Arc::clone(&kv) as Arc<dyn KeyValueStore>,
            Arc::clone(&users) as Arc<dyn UserStore>,
            Arc::clone(&mailer) as Arc<dyn EmailSender>,
        );
        Fixture {
            engine,
            users,
            mailer,
            kv,
        }
    }

    async fn seed_user(users: &MemoryAuthStore, email: &str) -> i64 {
        let outcome = users
            .create(NewUser {
                email: email.to_string(),
                username: email.split('@').next().unwrap().to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                password_hash: "digest".to_string(),
            })
            .await
            .expect("create");
        match outcome {
            CreateUserOutcome::Created(id) => id,
            _ => panic!("expected creation"),
        }
    }

    fn code_from(body: &str) -> String {
        body.chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take(6)
            .collect()
    }

    #[tokio::test]
    async fn request_and_verify_flips_account_to_verified() -> AuthResult<()> {
        let fx = fixture().await;
        let user_id = seed_user(&fx.users, "alice@example.com").await;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "Alice@Example.com", None)
            .await?;
        let body = fx.mailer.last_body().await.expect("mail sent");
        let code = code_from(&body);
        fx.engine.verify_email("alice@example.com", &code).await?;
        let user = UserStore::find_by_id(&*fx.users, user_id)
            .await
            .map_err(AuthError::Internal)?
            .expect("user");
        assert!(user.is_verified());
        Ok(())
    }

    #[tokio::test]
    async fn code_is_single_use() -> AuthResult<()> {
        let fx = fixture().await;
        seed_user(&fx.users, "alice@example.com").await;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
            .await?;
        let code = code_from(&fx.mailer.last_body().await.expect("mail"));
        fx.engine.verify_email("alice@example.com", &code).await?;
        assert!(matches!(
            fx.engine.verify_email("alice@example.com", &code).await,
            Err(AuthError::CodeExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_guesses_burn_the_code() -> AuthResult<()> {
        let fx = fixture().await;
        seed_user(&fx.users, "alice@example.com").await;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
            .await?;
        let real = code_from(&fx.mailer.last_body().await.expect("mail"));
        let wrong = if real == "000000" { "000001" } else { "000000" };

        for remaining in (1..=4).rev() {
            let err = fx
                .engine
                .check_code(CodePurpose::EmailVerification, "alice@example.com", wrong)
                .await
                .expect_err("wrong code");
            match err {
                AuthError::CodeInvalid { attempts_remaining } => {
                    assert_eq!(attempts_remaining, remaining);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        // Fifth wrong guess exhausts the code.
        assert!(matches!(
            fx.engine
                .check_code(CodePurpose::EmailVerification, "alice@example.com", wrong)
                .await,
            Err(AuthError::CodeExhausted)
        ));
        // Even the real code is dead now.
        assert!(matches!(
            fx.engine
                .check_code(CodePurpose::EmailVerification, "alice@example.com", &real)
                .await,
            Err(AuthError::CodeExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn resend_cooldown_applies_to_unknown_addresses_too() -> AuthResult<()> {
        let fx = fixture().await;
        seed_user(&fx.users, "alice@example.com").await;
        fx.engine
            .request_code(CodePurpose::PasswordReset, "alice@example.com", None)
            .await?;
        fx.engine
            .request_code(CodePurpose::PasswordReset, "ghost@example.com", None)
            .await?;
        // Both addresses now behave identically on an immediate resend.
        for email in ["alice@example.com", "ghost@example.com"] {
            assert!(matches!(
                fx.engine
                    .request_code(CodePurpose::PasswordReset, email, None)
                    .await,
                Err(AuthError::ResendTooSoon { .. })
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_address_sends_nothing_but_succeeds() -> AuthResult<()> {
        let fx = fixture().await;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "ghost@example.com", None)
            .await?;
        assert!(fx.mailer.last_body().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn already_verified_account_gets_no_verification_mail() -> AuthResult<()> {
        let fx = fixture().await;
        let user_id = seed_user(&fx.users, "alice@example.com").await;
        fx.users.mark_email_verified(user_id).await?;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
            .await?;
        assert!(fx.mailer.last_body().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let fx = fixture().await;
        assert!(matches!(
            fx.engine
                .request_code(CodePurpose::EmailVerification, "not-an-email", None)
                .await,
            Err(AuthError::InvalidEmail)
        ));
    }

    #[tokio::test]
    async fn send_failure_surfaces_after_retry() -> AuthResult<()> {
        let fx = fixture().await;
        seed_user(&fx.users, "alice@example.com").await;
        fx.mailer.fail(true);
        assert!(matches!(
            fx.engine
                .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
                .await,
            Err(AuthError::EmailSendFailed)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn per_ip_send_limit_applies() -> AuthResult<()> {
        let fx = fixture().await;
        seed_user(&fx.users, "alice@example.com").await;
        // Distinct addresses so the cooldown does not interfere.
        for n in 0..3 {
            fx.engine
                .request_code(
                    CodePurpose::PasswordReset,
                    &format!("user{n}@example.com"),
                    Some("1.2.3.4"),
                )
                .await?;
        }
        assert!(matches!(
            fx.engine
                .request_code(
                    CodePurpose::PasswordReset,
                    "user4@example.com",
                    Some("1.2.3.4")
                )
                .await,
            Err(AuthError::RateLimited { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn a_new_code_replaces_the_old_one() -> AuthResult<()> {
        let fx = fixture_with(
            AuthConfig::new(secrecy::SecretString::from("unit-test-secret".to_string()))
                .with_resend_cooldown_seconds(0),
        )
        .await;
        seed_user(&fx.users, "alice@example.com").await;
        fx.engine
            .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
            .await?;
        let first = code_from(&fx.mailer.last_body().await.expect("mail"));
        // Burn one attempt against the first code.
        let wrong = if first == "000000" { "000001" } else { "000000" };
        let _ = fx
            .engine
            .check_code(CodePurpose::EmailVerification, "alice@example.com", wrong)
            .await;

        fx.engine
            .request_code(CodePurpose::EmailVerification, "alice@example.com", None)
            .await?;
        let second = code_from(&fx.mailer.last_body().await.expect("mail"));

        // Attempt budget restarted with the new code.
        let attempts = fx
            .kv
            .get(&attempts_key(
                CodePurpose::EmailVerification,
                "alice@example.com",
            ))
            .await
            .map_err(AuthError::Internal)?;
        assert!(attempts.is_none());

        if first != second {
            assert!(matches!(
                fx.engine
                    .check_code(
                        CodePurpose::EmailVerification,
                        "alice@example.com",
                        &first
                    )
                    .await,
                Err(AuthError::CodeInvalid { .. })
            ));
        }
        fx.engine
            .check_code(CodePurpose::EmailVerification, "alice@example.com", &second)
            .await?;
        Ok(())
    }
}
