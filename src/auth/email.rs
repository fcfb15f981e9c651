//! Outbound email port. Delivery and templating live behind this trait;
//! any failure surfaces as `EmailSendFailed` and is never retried here.

use async_trait::async_trait;
use tracing::info;

use crate::domain::Error;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification_email(&self, email: &str, code: &str) -> Result<(), Error>;

    async fn send_password_reset_email(&self, email: &str, code: &str) -> Result<(), Error>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_verification_email(&self, email: &str, code: &str) -> Result<(), Error> {
        info!(email, code, "verification email send stub");
        Ok(())
    }

    async fn send_password_reset_email(&self, email: &str, code: &str) -> Result<(), Error> {
        info!(email, code, "password reset email send stub");
        Ok(())
    }
}
