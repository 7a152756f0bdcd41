//! End-to-end flows over the engines, wired with in-process stores.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::Mutex;

use reviewinn_auth::auth::{
    config::AuthConfig,
    credentials::Registration,
    email::EmailSender,
    error::AuthError,
    kv::MemoryKvStore,
    memory::MemoryAuthStore,
    store::{SessionStore, UserStore},
    verification::CodePurpose,
    AuthState,
};

#[derive(Default)]
struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingEmailSender {
    async fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().await;
        sent.last().map(|(_, _, body)| {
            body.chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take(6)
                .collect()
        })
    }

    async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let mut sent = self.sent.lock().await;
        sent.push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct Harness {
    state: AuthState,
    mailer: Arc<RecordingEmailSender>,
}

fn harness() -> Harness {
    harness_with(AuthConfig::new(SecretString::from(
        "integration-test-secret".to_string(),
    )))
}

fn harness_with(config: AuthConfig) -> Harness {
    let store = Arc::new(MemoryAuthStore::new());
    let mailer = Arc::new(RecordingEmailSender::default());
    let state = AuthState::new(
        config,
        Arc::clone(&store) as Arc<dyn UserStore>,
        store as Arc<dyn SessionStore>,
        Arc::new(MemoryKvStore::new()),
        Arc::clone(&mailer) as Arc<dyn EmailSender>,
    );
    Harness { state, mailer }
}

fn registration(email: &str) -> Registration {
    Registration {
        email: email.to_string(),
        password: "Sup3r-secret".to_string(),
        username: None,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    }
}

async fn register_and_verify(h: &Harness, email: &str) {
    h.state
        .credentials()
        .register(registration(email), None)
        .await
        .expect("registration");
    let code = h.mailer.last_code().await.expect("verification mail");
    h.state
        .verification()
        .verify_email(email, &code)
        .await
        .expect("verification");
}

#[tokio::test]
async fn register_verify_login_happy_path() {
    let h = harness();

    let registered = h
        .state
        .credentials()
        .register(registration("ada@example.com"), None)
        .await
        .expect("registration");
    assert_eq!(registered.email, "ada@example.com");
    assert_eq!(registered.username, "ada");

    // Unverified accounts cannot log in under the default policy.
    let err = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect_err("unverified login");
    assert!(matches!(err, AuthError::EmailVerificationRequired));

    let code = h.mailer.last_code().await.expect("verification mail");
    h.state
        .verification()
        .verify_email("ada@example.com", &code)
        .await
        .expect("verification");

    let pair = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("login");
    assert_eq!(pair.token_type, "Bearer");

    let claims = h
        .state
        .tokens()
        .verify_access(&pair.access_token)
        .await
        .expect("access token");
    assert_eq!(claims.sub, registered.user_id.to_string());

    // Username also works as the login identifier.
    h.state
        .credentials()
        .login("ada", "Sup3r-secret", "test", "")
        .await
        .expect("username login");
}

#[tokio::test]
async fn registration_conflicts_and_derived_usernames() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;

    let err = h
        .state
        .credentials()
        .register(registration("ada@example.com"), None)
        .await
        .expect_err("duplicate email");
    assert!(matches!(err, AuthError::EmailTaken));

    // Same local part, different domain: the derived username gets a suffix.
    let second = h
        .state
        .credentials()
        .register(registration("ada@other.org"), None)
        .await
        .expect("second registration");
    assert!(second.username.starts_with("ada"));
    assert_ne!(second.username, "ada");

    let mut taken = registration("third@example.com");
    taken.username = Some("ada".to_string());
    let err = h
        .state
        .credentials()
        .register(taken, None)
        .await
        .expect_err("requested username taken");
    assert!(matches!(err, AuthError::UsernameTaken));
}

#[tokio::test]
async fn weak_password_is_rejected_before_any_state_changes() {
    let h = harness();
    let mut weak = registration("ada@example.com");
    weak.password = "short".to_string();
    let err = h
        .state
        .credentials()
        .register(weak, None)
        .await
        .expect_err("weak password");
    assert!(matches!(err, AuthError::WeakPassword(_)));
    assert_eq!(h.mailer.count().await, 0);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;

    // Four failures stay plain rejections.
    for _ in 0..4 {
        let err = h
            .state
            .credentials()
            .login("ada@example.com", "Wrong-pass1!", "test", "")
            .await
            .expect_err("wrong password");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
    // The fifth failure locks but still reads as invalid credentials.
    let err = h
        .state
        .credentials()
        .login("ada@example.com", "Wrong-pass1!", "test", "")
        .await
        .expect_err("wrong password at threshold");
    assert!(matches!(err, AuthError::InvalidCredentials));

    // From now on even the correct password answers locked, with a retry hint.
    let err = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect_err("locked account");
    match err {
        AuthError::AccountLocked {
            retry_after_seconds,
        } => assert!(retry_after_seconds > 0 && retry_after_seconds <= 900),
        other => panic!("expected lock, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_rotation_detects_reuse() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;

    let first = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("login");
    let second = h
        .state
        .tokens()
        .refresh(&first.refresh_token)
        .await
        .expect("first refresh");

    // Replaying the superseded token revokes the whole session.
    let err = h
        .state
        .tokens()
        .refresh(&first.refresh_token)
        .await
        .expect_err("reused refresh token");
    assert!(matches!(err, AuthError::InvalidRefresh));
    let err = h
        .state
        .tokens()
        .refresh(&second.refresh_token)
        .await
        .expect_err("successor after reuse");
    assert!(matches!(err, AuthError::InvalidRefresh));
    let err = h
        .state
        .tokens()
        .verify_access(&second.access_token)
        .await
        .expect_err("access after reuse");
    assert!(matches!(err, AuthError::Unauthenticated));
}

#[tokio::test]
async fn logout_invalidates_access_immediately() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;
    let pair = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("login");

    h.state
        .credentials()
        .logout(&pair.session_id)
        .await
        .expect("logout");
    assert!(matches!(
        h.state.tokens().verify_access(&pair.access_token).await,
        Err(AuthError::Unauthenticated)
    ));
    assert!(matches!(
        h.state.tokens().refresh(&pair.refresh_token).await,
        Err(AuthError::InvalidRefresh)
    ));
}

#[tokio::test]
async fn password_reset_revokes_sessions_and_stays_opaque() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;
    let pair = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("login");

    let mails_before = h.mailer.count().await;
    // Unknown addresses get the same success and send nothing.
    h.state
        .verification()
        .request_code(CodePurpose::PasswordReset, "ghost@example.com", None)
        .await
        .expect("opaque request");
    assert_eq!(h.mailer.count().await, mails_before);

    h.state
        .verification()
        .request_code(CodePurpose::PasswordReset, "ada@example.com", None)
        .await
        .expect("reset request");
    let code = h.mailer.last_code().await.expect("reset mail");

    h.state
        .credentials()
        .reset_password("ada@example.com", &code, "N3w-password!")
        .await
        .expect("reset");

    // Old sessions and the old password are both dead.
    assert!(matches!(
        h.state.tokens().verify_access(&pair.access_token).await,
        Err(AuthError::Unauthenticated)
    ));
    assert!(matches!(
        h.state
            .credentials()
            .login("ada@example.com", "Sup3r-secret", "test", "")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    h.state
        .credentials()
        .login("ada@example.com", "N3w-password!", "test", "")
        .await
        .expect("login with new password");
}

#[tokio::test]
async fn change_password_rotates_sessions_for_the_caller() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;
    let old_pair = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("login");
    let claims = h
        .state
        .tokens()
        .verify_access(&old_pair.access_token)
        .await
        .expect("claims");
    let user_id: i64 = claims.sub.parse().expect("user id");

    let err = h
        .state
        .credentials()
        .change_password(user_id, "Wrong-pass1!", "N3w-password!", "test", "")
        .await
        .expect_err("wrong current password");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let new_pair = h
        .state
        .credentials()
        .change_password(user_id, "Sup3r-secret", "N3w-password!", "test", "")
        .await
        .expect("change password");

    assert!(matches!(
        h.state.tokens().verify_access(&old_pair.access_token).await,
        Err(AuthError::Unauthenticated)
    ));
    h.state
        .tokens()
        .verify_access(&new_pair.access_token)
        .await
        .expect("fresh pair works");
}

#[tokio::test]
async fn reset_code_exhausts_after_wrong_guesses() {
    let h = harness();
    register_and_verify(&h, "ada@example.com").await;
    h.state
        .verification()
        .request_code(CodePurpose::PasswordReset, "ada@example.com", None)
        .await
        .expect("reset request");
    let real = h.mailer.last_code().await.expect("reset mail");
    let wrong = if real == "000000" { "000001" } else { "000000" };

    for _ in 0..4 {
        let err = h
            .state
            .credentials()
            .reset_password("ada@example.com", wrong, "N3w-password!")
            .await
            .expect_err("wrong code");
        assert!(matches!(err, AuthError::CodeInvalid { .. }));
    }
    assert!(matches!(
        h.state
            .credentials()
            .reset_password("ada@example.com", wrong, "N3w-password!")
            .await,
        Err(AuthError::CodeExhausted)
    ));
    // The real code died with the budget; the old password still works.
    assert!(matches!(
        h.state
            .credentials()
            .reset_password("ada@example.com", &real, "N3w-password!")
            .await,
        Err(AuthError::CodeExpired)
    ));
    h.state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "")
        .await
        .expect("old password unaffected");
}

#[tokio::test]
async fn per_ip_login_limit_applies_before_credentials() {
    let config = AuthConfig::new(SecretString::from("integration-test-secret".to_string()));
    let h = harness_with(config);
    register_and_verify(&h, "ada@example.com").await;

    // Default budget is 10 per minute per address.
    for _ in 0..10 {
        let _ = h
            .state
            .credentials()
            .login("ada@example.com", "Wrong-pass1!", "test", "10.0.0.1")
            .await;
    }
    let err = h
        .state
        .credentials()
        .login("ada@example.com", "Sup3r-secret", "test", "10.0.0.1")
        .await
        .expect_err("limited");
    assert!(matches!(err, AuthError::RateLimited { .. }));
}
