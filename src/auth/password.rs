//! Password hashing and policy enforcement.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::config::AuthConfig;
use super::error::{AuthError, AuthResult};

/// Hash a password with Argon2id and a fresh random salt.
///
/// # Errors
///
/// Returns `Internal` if the hasher fails (effectively never for valid input).
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let digest = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("password hashing failed: {err}")))?;
    Ok(digest.to_string())
}

/// Verify a password against a stored digest.
///
/// Returns `false` for any malformed digest rather than erroring; the caller
/// treats that the same as a mismatch.
#[must_use]
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// A digest of a throwaway password, verified against when the login
/// identifier resolves to no user so that unknown-user and wrong-password
/// paths take comparable time.
pub fn dummy_digest() -> String {
    // The plaintext is irrelevant; verification will always fail.
    hash_password("reviewinn-timing-pad").unwrap_or_default()
}

/// Validate a candidate password against the configured policy.
///
/// # Errors
///
/// Returns `WeakPassword` naming every failing rule.
pub fn validate_password(config: &AuthConfig, password: &str) -> AuthResult<()> {
    let mut failing: Vec<&str> = Vec::new();

    if password.chars().count() < config.password_min_length() {
        failing.push("min_length");
    }
    if config.password_require_upper() && !password.chars().any(|c| c.is_ascii_uppercase()) {
        failing.push("require_upper");
    }
    if config.password_require_lower() && !password.chars().any(|c| c.is_ascii_lowercase()) {
        failing.push("require_lower");
    }
    if config.password_require_digit() && !password.chars().any(|c| c.is_ascii_digit()) {
        failing.push("require_digit");
    }
    if config.password_require_special()
        && !password.chars().any(|c| !c.is_ascii_alphanumeric())
    {
        failing.push("require_special");
    }

    if failing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(failing.join(", ")))
    }
}
