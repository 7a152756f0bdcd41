//! Structured error surface for the auth engines.
//!
//! Engines return these variants; the HTTP layer maps them to status codes
//! in one place (`api::response`). Dependency failures are kept separate from
//! programmer errors so rate limiting and code checks can fail closed with a
//! transient 503 instead of silently allowing traffic.

use thiserror::Error;

/// Authentication and verification errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong credentials, unknown identifier, or both. Deliberately neutral.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account is temporarily locked after repeated failed logins.
    #[error("Account locked, retry in {retry_after_seconds}s")]
    AccountLocked { retry_after_seconds: i64 },

    /// Account soft-disabled by moderation or the user.
    #[error("Account disabled")]
    AccountDisabled,

    /// Policy requires a verified email before login.
    #[error("Email verification required")]
    EmailVerificationRequired,

    /// Password failed one or more policy rules (rule names inside).
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// Email address is malformed.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Email already registered (case-insensitive).
    #[error("Email already registered")]
    EmailTaken,

    /// Username already taken.
    #[error("Username already taken")]
    UsernameTaken,

    /// No live code for this email/purpose, or it aged out.
    #[error("Verification code expired")]
    CodeExpired,

    /// Supplied code did not match the live one.
    #[error("Invalid verification code, {attempts_remaining} attempts remaining")]
    CodeInvalid { attempts_remaining: u32 },

    /// The live code was burned after too many failed checks.
    #[error("Verification code exhausted")]
    CodeExhausted,

    /// A code was sent recently; wait out the cooldown.
    #[error("Code was sent recently, retry in {retry_after_seconds}s")]
    ResendTooSoon { retry_after_seconds: i64 },

    /// Fixed-window rate limit exceeded.
    #[error("Rate limited, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: i64 },

    /// Email delivery failed after retry.
    #[error("Email delivery failed")]
    EmailSendFailed,

    /// Refresh token unknown, expired, revoked, or already used.
    #[error("Invalid refresh token")]
    InvalidRefresh,

    /// Missing, malformed, or unverifiable bearer credentials.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Authenticated but missing the named predicate.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// A required dependency (KV, database, mail) is unreachable. Fail closed.
    #[error("Service unavailable")]
    Unavailable(#[source] anyhow::Error),

    /// Invariant violation or unexpected storage failure.
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable string constant surfaced to clients as `error_code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
            Self::EmailVerificationRequired => "EMAIL_VERIFICATION_REQUIRED",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::CodeInvalid { .. } => "CODE_INVALID",
            Self::CodeExhausted => "CODE_EXHAUSTED",
            Self::ResendTooSoon { .. } => "RESEND_TOO_SOON",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::EmailSendFailed => "EMAIL_SEND_FAILED",
            Self::InvalidRefresh => "INVALID_REFRESH",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-safe message. Internal detail stays in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Unavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Seconds the client should wait before retrying, when applicable.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            Self::AccountLocked {
                retry_after_seconds,
            }
            | Self::ResendTooSoon {
                retry_after_seconds,
            }
            | Self::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Result type for auth engine operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_constants() {
        assert_eq!(AuthError::InvalidCredentials.code(), "INVALID_CREDENTIALS");
        assert_eq!(
            AuthError::AccountLocked {
                retry_after_seconds: 900
            }
            .code(),
            "ACCOUNT_LOCKED"
        );
        assert_eq!(
            AuthError::CodeInvalid {
                attempts_remaining: 2
            }
            .code(),
            "CODE_INVALID"
        );
        assert_eq!(AuthError::InvalidRefresh.code(), "INVALID_REFRESH");
        assert_eq!(
            AuthError::Unavailable(anyhow::anyhow!("kv down")).code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = AuthError::Internal(anyhow::anyhow!("users table missing column"));
        assert_eq!(err.client_message(), "Internal server error");
        let err = AuthError::Unavailable(anyhow::anyhow!("redis connection refused"));
        assert_eq!(err.client_message(), "Service temporarily unavailable");
    }

    #[test]
    fn retry_after_only_for_throttled_variants() {
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 42
            }
            .retry_after_seconds(),
            Some(42)
        );
        assert_eq!(AuthError::InvalidCredentials.retry_after_seconds(), None);
    }
}
