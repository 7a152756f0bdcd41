//! Request-time identity resolution and authorization guards.

use axum::http::HeaderMap;
use std::sync::Arc;

use super::error::{AuthError, AuthResult};
use super::store::{Role, UserRecord, UserStore};
use super::tokens::TokenEngine;
use super::utils::extract_bearer_token;

/// The authenticated caller of one request.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
    pub session_id: String,
}

impl Principal {
    /// # Errors
    ///
    /// `Forbidden("verified_email")` when the email is unverified.
    pub fn require_verified(&self) -> AuthResult<()> {
        if self.user.is_verified() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("verified_email"))
        }
    }

    /// # Errors
    ///
    /// `Forbidden("admin")` unless the role is ADMIN or the `admin`
    /// permission is granted. Never derived from the numeric user id.
    pub fn require_admin(&self) -> AuthResult<()> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("admin"))
        }
    }

    /// # Errors
    ///
    /// `AccountDisabled` when the account has been deactivated.
    pub fn require_active(&self) -> AuthResult<()> {
        if self.user.is_active {
            Ok(())
        } else {
            Err(AuthError::AccountDisabled)
        }
    }

    /// # Errors
    ///
    /// `Forbidden` naming the role when the caller holds a different one.
    /// Admins pass every role check.
    pub fn require_role(&self, role: Role) -> AuthResult<()> {
        if self.user.role == role || self.user.role == Role::Admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden(role.as_str()))
        }
    }

    /// # Errors
    ///
    /// `Forbidden("premium")` for non-premium accounts.
    pub fn require_premium(&self) -> AuthResult<()> {
        if self.user.is_premium {
            Ok(())
        } else {
            Err(AuthError::Forbidden("premium"))
        }
    }

    /// # Errors
    ///
    /// `Forbidden` naming the first missing permission.
    pub fn require_permissions(&self, required: &[&'static str]) -> AuthResult<()> {
        for permission in required {
            if !self.user.permissions.iter().any(|p| p == permission) {
                return Err(AuthError::Forbidden(permission));
            }
        }
        Ok(())
    }
}

/// Turns a bearer token into a [`Principal`]. Every resolution re-checks the
/// session, so revocation is effective on the very next request.
pub struct PrincipalResolver {
    tokens: Arc<TokenEngine>,
    users: Arc<dyn UserStore>,
}

impl PrincipalResolver {
    #[must_use]
    pub fn new(tokens: Arc<TokenEngine>, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    /// Resolve the caller or fail with `Unauthenticated`.
    pub async fn resolve_required(&self, headers: &HeaderMap) -> AuthResult<Principal> {
        let token = extract_bearer_token(headers).ok_or(AuthError::Unauthenticated)?;
        let claims = self.tokens.verify_access(&token).await?;
        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::Unauthenticated)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.is_active {
            return Err(AuthError::Unauthenticated);
        }

        // Activity stamp is best effort and never fails the request.
        if let Err(err) = self.users.touch_last_active(user_id).await {
            tracing::warn!(%err, user_id, "failed to stamp last_active_at");
        }

        Ok(Principal {
            user,
            session_id: claims.session_id,
        })
    }

    /// Resolve the caller if possible. Never fails: a missing header, a bad
    /// token, or a revoked session all yield `None`.
    pub async fn resolve_optional(&self, headers: &HeaderMap) -> Option<Principal> {
        self.resolve_required(headers).await.ok()
    }
}
