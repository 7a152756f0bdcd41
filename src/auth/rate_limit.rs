//! Fixed-window rate limiting on top of the key-value store.

use std::sync::Arc;
use std::time::Duration;

use super::error::{AuthError, AuthResult};
use super::kv::KeyValueStore;

/// Fixed-window counter per `(scope, subject)` pair. The window starts on the
/// first hit and is never extended by later ones. A key-value failure denies
/// the request instead of waving it through.
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Count one hit for `subject` within `scope` and reject once the window
    /// holds more than `limit` hits.
    ///
    /// # Errors
    ///
    /// `RateLimited` when over the limit, `Unavailable` when the store fails.
    pub async fn check(
        &self,
        scope: &str,
        subject: &str,
        limit: i64,
        window: Duration,
    ) -> AuthResult<()> {
        let key = format!("rate:{scope}:{subject}");
        let count = self
            .kv
            .incr(&key, window)
            .await
            .map_err(AuthError::Unavailable)?;
        if count <= limit {
            return Ok(());
        }
        let retry_after_seconds = match self.kv.ttl(&key).await.map_err(AuthError::Unavailable)? {
            Some(remaining) => i64::try_from(remaining.as_secs().max(1)).unwrap_or(i64::MAX),
            None => i64::try_from(window.as_secs()).unwrap_or(i64::MAX),
        };
        Err(AuthError::RateLimited {
            retry_after_seconds,
        })
    }
}
