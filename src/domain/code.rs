use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

/// What a verification code proves. A user has at most one live code per
/// kind; the orchestrator deletes any prior code before creating a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationCodeKind {
    EmailVerification,
    PasswordReset,
}

impl VerificationCodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email_verification" => Some(Self::EmailVerification),
            "password_reset" => Some(Self::PasswordReset),
            _ => None,
        }
    }
}

/// A single-use, typed, expiring code tied to a user. The code string is
/// generated by the caller and opaque here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub id: Ulid,
    pub user_id: Ulid,
    pub code: String,
    pub kind: VerificationCodeKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Build a code expiring `lifetime` from now. Construction never fails;
    /// a negative lifetime yields an already-expired code.
    #[must_use]
    pub fn new(user_id: Ulid, code: String, kind: VerificationCodeKind, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new(),
            user_id,
            code,
            kind,
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_code_is_not_expired() {
        let code = VerificationCode::new(
            Ulid::new(),
            "123456".to_string(),
            VerificationCodeKind::EmailVerification,
            Duration::hours(24),
        );
        assert!(!code.is_expired(Utc::now()));
    }

    #[test]
    fn negative_lifetime_yields_expired_code() {
        let code = VerificationCode::new(
            Ulid::new(),
            "123456".to_string(),
            VerificationCodeKind::PasswordReset,
            Duration::hours(-1),
        );
        assert!(code.is_expired(Utc::now()));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            VerificationCodeKind::EmailVerification,
            VerificationCodeKind::PasswordReset,
        ] {
            assert_eq!(VerificationCodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(VerificationCodeKind::parse("totp"), None);
    }
}
