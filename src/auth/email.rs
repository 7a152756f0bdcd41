//! Outbound email seam.
//!
//! The verification engine only knows this trait. Production wires an SMTP
//! sender; development and tests use the logging sender below.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Writes the message to the log instead of delivering it. The body carries
/// the verification code, so local flows stay testable end to end.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(%to, %subject, %body, "email (log sender)");
        Ok(())
    }
}
