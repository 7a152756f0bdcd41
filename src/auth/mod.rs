//! Authentication, verification, and session management.
//!
//! The engines in this module are transport-agnostic; the HTTP layer in
//! [`crate::api`] is a thin adapter over them. Persistence and delivery go
//! through the [`store`], [`kv`], and [`email`] seams so production wiring
//! and tests differ only in construction.

pub mod config;
pub mod credentials;
pub mod email;
pub mod error;
pub mod kv;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod principal;
pub mod rate_limit;
pub mod store;
pub mod token;
pub mod tokens;
pub mod utils;
pub mod verification;

use std::sync::Arc;

use config::AuthConfig;
use credentials::CredentialEngine;
use email::EmailSender;
use kv::KeyValueStore;
use principal::PrincipalResolver;
use rate_limit::RateLimiter;
use store::{SessionStore, UserStore};
use tokens::TokenEngine;
use verification::VerificationEngine;

/// Everything a request handler needs, shared as one `Arc`.
pub struct AuthState {
    config: Arc<AuthConfig>,
    credentials: CredentialEngine,
    verification: Arc<VerificationEngine>,
    tokens: Arc<TokenEngine>,
    principal: PrincipalResolver,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        kv: Arc<dyn KeyValueStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = RateLimiter::new(Arc::clone(&kv));
        let tokens = Arc::new(TokenEngine::new(
            Arc::clone(&config),
            Arc::clone(&sessions),
        ));
        let verification = Arc::new(VerificationEngine::new(
            Arc::clone(&config),
            kv,
            Arc::clone(&users),
            mailer,
        ));
        let credentials = CredentialEngine::new(
            Arc::clone(&config),
            Arc::clone(&users),
            Arc::clone(&tokens),
            Arc::clone(&verification),
            limiter,
        );
        let principal = PrincipalResolver::new(Arc::clone(&tokens), users);
        Self {
            config,
            credentials,
            verification,
            tokens,
            principal,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialEngine {
        &self.credentials
    }

    #[must_use]
    pub fn verification(&self) -> &VerificationEngine {
        &self.verification
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenEngine {
        &self.tokens
    }

    #[must_use]
    pub fn principal(&self) -> &PrincipalResolver {
        &self.principal
    }
}
