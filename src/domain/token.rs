use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Signed token payload. The key id (`kid`) that produced the signature
/// travels in the JWT header, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    #[must_use]
    pub fn is_expired(&self, now_unix_seconds: i64) -> bool {
        self.exp <= now_unix_seconds
    }
}

/// Access + refresh token pair. No server-side state beyond blacklist
/// entries created on revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Short-lived ticket issued after the password check when a second
/// factor is still required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MfaTicket {
    pub ticket: String,
    pub expires_at: DateTime<Utc>,
}

/// What a successful password login yields: either a token pair, or an
/// MFA ticket to be exchanged by the second-factor step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Tokens(TokenPair),
    MfaRequired(MfaTicket),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_expiry_is_inclusive() {
        let claims = Claims {
            sub: "user".to_string(),
            roles: vec![],
            iat: 1_000,
            exp: 2_000,
            jti: "jti".to_string(),
        };
        assert!(!claims.is_expired(1_999));
        assert!(claims.is_expired(2_000));
        assert!(claims.is_expired(2_001));
    }
}
