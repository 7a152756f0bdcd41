//! Immutable policy surface for the auth engines.
//!
//! Every tunable is an explicit field with a default; unknown options simply
//! do not exist. The config is validated once at startup and never mutated
//! afterwards.

use anyhow::{bail, Result};
use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 120;
const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;
const DEFAULT_JWT_AUDIENCE: &str = "reviewinn";
const DEFAULT_JWT_ISSUER: &str = "reviewinn-api";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    jwt_algorithm: Algorithm,
    jwt_audience: String,
    jwt_issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    code_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    max_code_attempts: u32,
    max_login_attempts: u32,
    lockout_seconds: i64,
    password_min_length: usize,
    password_require_upper: bool,
    password_require_lower: bool,
    password_require_digit: bool,
    password_require_special: bool,
    require_email_verification_for_login: bool,
    login_ip_limit: i64,
    login_ip_window_seconds: i64,
    register_ip_limit: i64,
    register_ip_window_seconds: i64,
    code_send_ip_limit: i64,
    code_send_ip_window_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_string(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            password_require_upper: true,
            password_require_lower: true,
            password_require_digit: true,
            password_require_special: true,
            require_email_verification_for_login: true,
            login_ip_limit: 10,
            login_ip_window_seconds: 60,
            register_ip_limit: 5,
            register_ip_window_seconds: 600,
            code_send_ip_limit: 3,
            code_send_ip_window_seconds: 60,
        }
    }

    /// Reject configurations that must never reach request time.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty secret, a non-HMAC algorithm, an empty
    /// audience or issuer, or non-positive lifetimes.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.expose_secret().is_empty() {
            bail!("JWT secret must not be empty");
        }
        match self.jwt_algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {}
            other => bail!("JWT algorithm {other:?} is not an HMAC algorithm"),
        }
        if self.jwt_audience.is_empty() {
            bail!("JWT audience must not be empty");
        }
        if self.jwt_issuer.is_empty() {
            bail!("JWT issuer must not be empty");
        }
        if self.access_ttl_seconds <= 0
            || self.refresh_ttl_seconds <= 0
            || self.code_ttl_seconds <= 0
        {
            bail!("token and code lifetimes must be positive");
        }
        if self.max_code_attempts == 0 || self.max_login_attempts == 0 {
            bail!("attempt limits must be positive");
        }
        Ok(())
    }

    #[must_use]
    pub fn with_jwt_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.jwt_algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_jwt_audience(mut self, audience: String) -> Self {
        self.jwt_audience = audience;
        self
    }

    #[must_use]
    pub fn with_jwt_issuer(mut self, issuer: String) -> Self {
        self.jwt_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_code_attempts(mut self, attempts: u32) -> Self {
        self.max_code_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn with_password_require_upper(mut self, required: bool) -> Self {
        self.password_require_upper = required;
        self
    }

    #[must_use]
    pub fn with_password_require_lower(mut self, required: bool) -> Self {
        self.password_require_lower = required;
        self
    }

    #[must_use]
    pub fn with_password_require_digit(mut self, required: bool) -> Self {
        self.password_require_digit = required;
        self
    }

    #[must_use]
    pub fn with_password_require_special(mut self, required: bool) -> Self {
        self.password_require_special = required;
        self
    }

    #[must_use]
    pub fn with_require_email_verification_for_login(mut self, required: bool) -> Self {
        self.require_email_verification_for_login = required;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn jwt_algorithm(&self) -> Algorithm {
        self.jwt_algorithm
    }

    #[must_use]
    pub fn jwt_audience(&self) -> &str {
        &self.jwt_audience
    }

    #[must_use]
    pub fn jwt_issuer(&self) -> &str {
        &self.jwt_issuer
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn max_code_attempts(&self) -> u32 {
        self.max_code_attempts
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }

    #[must_use]
    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    #[must_use]
    pub fn password_require_upper(&self) -> bool {
        self.password_require_upper
    }

    #[must_use]
    pub fn password_require_lower(&self) -> bool {
        self.password_require_lower
    }

    #[must_use]
    pub fn password_require_digit(&self) -> bool {
        self.password_require_digit
    }

    #[must_use]
    pub fn password_require_special(&self) -> bool {
        self.password_require_special
    }

    #[must_use]
    pub fn require_email_verification_for_login(&self) -> bool {
        self.require_email_verification_for_login
    }

    #[must_use]
    pub fn login_ip_limit(&self) -> i64 {
        self.login_ip_limit
    }

    #[must_use]
    pub fn login_ip_window_seconds(&self) -> i64 {
        self.login_ip_window_seconds
    }

    #[must_use]
    pub fn register_ip_limit(&self) -> i64 {
        self.register_ip_limit
    }

    #[must_use]
    pub fn register_ip_window_seconds(&self) -> i64 {
        self.register_ip_window_seconds
    }

    #[must_use]
    pub fn code_send_ip_limit(&self) -> i64 {
        self.code_send_ip_limit
    }

    #[must_use]
    pub fn code_send_ip_window_seconds(&self) -> i64 {
        self.code_send_ip_window_seconds
    }
}
