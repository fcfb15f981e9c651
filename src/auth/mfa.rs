//! Multi-factor port. Login asks whether a second factor is required and,
//! if so, gets a short-lived ticket to hand back instead of a token pair.
//! The factor verification itself (TOTP, backup codes) lives behind the
//! port and exchanges the ticket for a token pair in its own flow.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ulid::Ulid;
use uuid::Uuid;

use crate::domain::{Error, MfaTicket};

pub const DEFAULT_TICKET_TTL_SECONDS: i64 = 5 * 60;

#[async_trait]
pub trait MfaProvider: Send + Sync {
    /// Whether the account has a second factor enrolled and enabled.
    async fn is_enabled(&self, user_id: Ulid) -> Result<bool, Error>;

    /// Issue a challenge ticket for the user after the password check.
    async fn issue_ticket(&self, user_id: Ulid) -> Result<MfaTicket, Error>;
}

/// Provider used when MFA is not deployed: no account requires a second
/// factor, and tickets are never issued.
#[derive(Clone, Debug, Default)]
pub struct MfaDisabled;

#[async_trait]
impl MfaProvider for MfaDisabled {
    async fn is_enabled(&self, _user_id: Ulid) -> Result<bool, Error> {
        Ok(false)
    }

    async fn issue_ticket(&self, _user_id: Ulid) -> Result<MfaTicket, Error> {
        Err(Error::Internal("mfa is not enabled".to_string()))
    }
}

/// Build a ticket with the default lifetime; providers can use this as
/// their issuance primitive.
#[must_use]
pub fn new_ticket() -> MfaTicket {
    MfaTicket {
        ticket: Uuid::new_v4().to_string(),
        expires_at: Utc::now() + Duration::seconds(DEFAULT_TICKET_TTL_SECONDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_provider_never_requires_mfa() -> Result<(), Error> {
        let provider = MfaDisabled;
        assert!(!provider.is_enabled(Ulid::new()).await?);
        assert!(provider.issue_ticket(Ulid::new()).await.is_err());
        Ok(())
    }

    #[test]
    fn tickets_are_short_lived_and_unique() {
        let a = new_ticket();
        let b = new_ticket();
        assert_ne!(a.ticket, b.ticket);
        assert!(a.expires_at > Utc::now());
        assert!(a.expires_at <= Utc::now() + Duration::seconds(DEFAULT_TICKET_TTL_SECONDS));
    }
}
