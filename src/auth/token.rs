//! Access-token signing and verification.
//!
//! Access tokens are short-lived HMAC JWTs. Verification is strict: audience,
//! issuer, and expiry are enforced with zero leeway, and tokens dated in the
//! future are rejected.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::config::AuthConfig;
use super::error::{AuthError, AuthResult};
use super::utils::generate_opaque_id;

pub const TOKEN_TYPE_ACCESS: &str = "access";

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id as a decimal string.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
    pub jti: String,
    pub session_id: String,
    pub token_type: String,
}

/// Stateless JWT codec; session liveness is checked by the caller.
pub struct TokenSigner {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: String,
    issuer: String,
    access_ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret().expose_secret().as_bytes();
        let mut validation = Validation::new(config.jwt_algorithm());
        validation.leeway = 0;
        validation.set_audience(&[config.jwt_audience()]);
        validation.set_issuer(&[config.jwt_issuer()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        Self {
            header: Header::new(config.jwt_algorithm()),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            audience: config.jwt_audience().to_string(),
            issuer: config.jwt_issuer().to_string(),
            access_ttl_seconds: config.access_ttl_seconds(),
        }
    }

    /// Sign a fresh access token bound to `session_id`.
    ///
    /// # Errors
    ///
    /// Fails only when JWT encoding itself fails.
    pub fn sign_access(&self, user_id: i64, session_id: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.access_ttl_seconds,
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            jti: generate_opaque_id(),
            session_id: session_id.to_string(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        encode(&self.header, &claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(anyhow::Error::new(err).context("signing token")))
    }

    /// Decode and validate an access token.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for any malformed, mis-typed, expired, future-dated,
    /// or otherwise unverifiable token.
    pub fn decode_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::Unauthenticated)?;
        let claims = data.claims;
        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(AuthError::Unauthenticated);
        }
        // `iat` is not covered by the library validation.
        if claims.iat > Utc::now().timestamp() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(claims)
    }
}
