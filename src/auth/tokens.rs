//! Session issuance, access-token verification, and refresh rotation.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::config::AuthConfig;
use super::error::{AuthError, AuthResult};
use super::store::{SessionRecord, SessionStore};
use super::token::{AccessClaims, TokenSigner};
use super::utils::generate_opaque_id;

/// What a successful login or refresh hands back to the client.
#[derive(Clone, Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub session_id: String,
}

fn hash_refresh(refresh_token: &str) -> Vec<u8> {
    Sha256::digest(refresh_token.as_bytes()).to_vec()
}

/// Issues sessions and enforces the refresh single-use rule. Raw refresh
/// tokens exist only in transit; storage sees SHA-256 hashes.
pub struct TokenEngine {
    signer: TokenSigner,
    sessions: Arc<dyn SessionStore>,
    config: Arc<AuthConfig>,
}

impl TokenEngine {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            signer: TokenSigner::new(&config),
            sessions,
            config,
        }
    }

    /// Create a new session for `user_id` and sign its first token pair.
    pub async fn issue(
        &self,
        user_id: i64,
        device_fingerprint: &str,
        ip_address: &str,
    ) -> AuthResult<TokenPair> {
        let session_id = generate_opaque_id();
        let refresh_token = generate_opaque_id();
        let now = Utc::now();
        self.sessions
            .insert(SessionRecord {
                session_id: session_id.clone(),
                user_id,
                refresh_token_hash: hash_refresh(&refresh_token),
                previous_refresh_token_hash: None,
                issued_at: now,
                expires_at: now + ChronoDuration::seconds(self.config.refresh_ttl_seconds()),
                revoked: false,
                device_fingerprint: device_fingerprint.to_string(),
                ip_address: ip_address.to_string(),
            })
            .await?;
        let access_token = self.signer.sign_access(user_id, &session_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.config.access_ttl_seconds(),
            session_id,
        })
    }

    /// Verify an access token and confirm its session is still live. A valid
    /// signature alone is not enough; revocation takes effect immediately.
    pub async fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let claims = self.signer.decode_access(token)?;
        let session = self
            .sessions
            .find_by_id(&claims.session_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !session.is_live(Utc::now()) {
            return Err(AuthError::Unauthenticated);
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a fresh pair, rotating the stored hash.
    ///
    /// Presenting a superseded token is treated as theft evidence: the whole
    /// session is revoked. The session's `expires_at` is never extended by
    /// rotation.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let presented_hash = hash_refresh(refresh_token);
        let session = self
            .sessions
            .find_by_refresh_hash(&presented_hash)
            .await?
            .ok_or(AuthError::InvalidRefresh)?;

        if !session.is_live(Utc::now()) {
            self.sessions.revoke(&session.session_id).await?;
            return Err(AuthError::InvalidRefresh);
        }
        if session.previous_refresh_token_hash.as_deref() == Some(presented_hash.as_slice()) {
            tracing::warn!(
                session_id = %session.session_id,
                user_id = session.user_id,
                "refresh token reuse detected, revoking session"
            );
            self.sessions.revoke(&session.session_id).await?;
            return Err(AuthError::InvalidRefresh);
        }

        let next_refresh = generate_opaque_id();
        let swapped = self
            .sessions
            .rotate_refresh_hash(
                &session.session_id,
                &presented_hash,
                &hash_refresh(&next_refresh),
            )
            .await?;
        if !swapped {
            // Lost a race against a parallel refresh of the same token.
            self.sessions.revoke(&session.session_id).await?;
            return Err(AuthError::InvalidRefresh);
        }

        let access_token = self
            .signer
            .sign_access(session.user_id, &session.session_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token: next_refresh,
            token_type: "Bearer",
            expires_in: self.config.access_ttl_seconds(),
            session_id: session.session_id,
        })
    }

    /// Revoke one session. Idempotent.
    pub async fn revoke_session(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.revoke(session_id).await?;
        Ok(())
    }

    /// Revoke every session of a user; returns how many were live.
    pub async fn revoke_all(&self, user_id: i64) -> AuthResult<u64> {
        Ok(self.sessions.revoke_all_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuthStore;
    use secrecy::SecretString;

    fn engine() -> (TokenEngine, Arc<MemoryAuthStore>) {
        let store = Arc::new(MemoryAuthStore::new());
        let config = Arc::new(AuthConfig::new(SecretString::from(
            "unit-test-secret".to_string(),
        )));
        (
            TokenEngine::new(config, Arc::clone(&store) as Arc<dyn SessionStore>),
            store,
        )
    }

    #[tokio::test]
    async fn issue_then_verify_access() -> AuthResult<()> {
        let (engine, _) = engine();
        let pair = engine.issue(7, "cli", "127.0.0.1").await?;
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 15 * 60);
        let claims = engine.verify_access(&pair.access_token).await?;
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.session_id, pair.session_id);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_session_fails_verification_immediately() -> AuthResult<()> {
        let (engine, _) = engine();
        let pair = engine.issue(7, "cli", "127.0.0.1").await?;
        engine.revoke_session(&pair.session_id).await?;
        assert!(matches!(
            engine.verify_access(&pair.access_token).await,
            Err(AuthError::Unauthenticated)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_is_single_use() -> AuthResult<()> {
        let (engine, _) = engine();
        let first = engine.issue(7, "cli", "127.0.0.1").await?;
        let second = engine.refresh(&first.refresh_token).await?;
        assert_eq!(second.session_id, first.session_id);
        assert_ne!(second.refresh_token, first.refresh_token);

        // Reusing the superseded token revokes the session.
        assert!(matches!(
            engine.refresh(&first.refresh_token).await,
            Err(AuthError::InvalidRefresh)
        ));
        // The successor dies with it.
        assert!(matches!(
            engine.refresh(&second.refresh_token).await,
            Err(AuthError::InvalidRefresh)
        ));
        assert!(matches!(
            engine.verify_access(&second.access_token).await,
            Err(AuthError::Unauthenticated)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_does_not_extend_session_expiry() -> AuthResult<()> {
        let (engine, store) = engine();
        let pair = engine.issue(7, "cli", "127.0.0.1").await?;
        let before = SessionStore::find_by_id(&*store, &pair.session_id)
            .await
            .map_err(AuthError::Internal)?
            .expect("session");
        engine.refresh(&pair.refresh_token).await?;
        let after = SessionStore::find_by_id(&*store, &pair.session_id)
            .await
            .map_err(AuthError::Internal)?
            .expect("session");
        assert_eq!(before.expires_at, after.expires_at);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_rejected() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.refresh("never-issued").await,
            Err(AuthError::InvalidRefresh)
        ));
    }

    #[tokio::test]
    async fn revoke_all_counts_live_sessions() -> AuthResult<()> {
        let (engine, _) = engine();
        engine.issue(7, "a", "ip").await?;
        engine.issue(7, "b", "ip").await?;
        engine.issue(8, "c", "ip").await?;
        assert_eq!(engine.revoke_all(7).await?, 2);
        assert_eq!(engine.revoke_all(7).await?, 0);
        Ok(())
    }
}
