//! Credential-pair issuance and validation on top of the composite
//! signing strategy, plus the in-memory revocation registry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{error, info};
use ulid::Ulid;
use uuid::Uuid;

use crate::domain::{Claims, Error, TokenPair};
use crate::jwt::jwks::Jwks;
use crate::jwt::{CompositeStrategy, SigningStrategy};

/// The token operations the orchestrator and handlers consume. Kept as a
/// trait so flows can be tested without real keys.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_pair(&self, user_id: Ulid, roles: &[String]) -> Result<TokenPair, Error>;

    async fn validate(&self, token: &str) -> Result<Claims, Error>;

    fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>);

    fn is_revoked(&self, token_id: &str) -> bool;

    async fn jwks(&self) -> Result<Jwks, Error>;

    async fn rotate(&self) -> Result<(), Error>;

    async fn try_remote(&self) -> Result<(), Error>;
}

pub struct TokenService {
    strategy: CompositeStrategy,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// Revoked token ids with the revocation horizon. Entries past their
    /// expiry are inert and purged on writes.
    blacklist: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TokenService {
    #[must_use]
    pub fn new(strategy: CompositeStrategy, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            strategy,
            access_ttl,
            refresh_ttl,
            blacklist: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the remote signing backend is currently active; used by the
    /// periodic recovery probe to skip redundant fail-back attempts.
    pub async fn remote_active(&self) -> bool {
        self.strategy.remote_active().await
    }

    fn claims_for(&self, user_id: Ulid, roles: &[String], ttl: Duration) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn lock_blacklist(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.blacklist
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenIssuer for TokenService {
    /// Issue an access/refresh pair for the user. Each token carries its
    /// own `jti`; both are signed by whichever backend is active.
    async fn issue_pair(&self, user_id: Ulid, roles: &[String]) -> Result<TokenPair, Error> {
        let access_claims = self.claims_for(user_id, roles, self.access_ttl);
        let refresh_claims = self.claims_for(user_id, roles, self.refresh_ttl);

        let access_token = self.strategy.sign(&access_claims).await.map_err(|err| {
            error!(error = %err, "failed to sign access token");
            Error::SigningFailed
        })?;
        let refresh_token = self.strategy.sign(&refresh_claims).await.map_err(|err| {
            error!(error = %err, "failed to sign refresh token");
            Error::SigningFailed
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify signature and expiry, then reject revoked token ids.
    async fn validate(&self, token: &str) -> Result<Claims, Error> {
        let claims = self.strategy.verify(token).await?;

        if self.is_revoked(&claims.jti) {
            return Err(Error::Revoked);
        }

        Ok(claims)
    }

    fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        let mut blacklist = self.lock_blacklist();
        blacklist.retain(|_, expiry| *expiry > now);
        blacklist.insert(token_id.to_string(), expires_at);
        info!(token_id, "revoked token");
    }

    fn is_revoked(&self, token_id: &str) -> bool {
        let now = Utc::now();
        self.lock_blacklist()
            .get(token_id)
            .is_some_and(|expiry| *expiry > now)
    }

    async fn jwks(&self) -> Result<Jwks, Error> {
        self.strategy.jwks().await
    }

    /// Rotate the active backend's key. Invoked on a schedule by an
    /// external collaborator, not from the request paths.
    async fn rotate(&self) -> Result<(), Error> {
        self.strategy.rotate_key().await
    }

    async fn try_remote(&self) -> Result<(), Error> {
        self.strategy.try_remote().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{testkey, LocalStrategy};
    use std::sync::Arc;

    fn local_only_service() -> TokenService {
        let local = LocalStrategy::from_pem(testkey::TEST_PRIVATE_KEY_PEM, 2048)
            .expect("test key loads");
        let strategy = CompositeStrategy::new(None, Arc::new(local));
        TokenService::new(strategy, Duration::minutes(15), Duration::hours(24))
    }

    #[tokio::test]
    async fn issued_pair_validates_and_carries_roles() -> Result<(), Error> {
        let service = local_only_service();
        let user_id = Ulid::new();
        let roles = vec!["user".to_string(), "admin".to_string()];

        let pair = service.issue_pair(user_id, &roles).await?;
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());

        let claims = service.validate(&pair.access_token).await?;
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.roles, roles);
        Ok(())
    }

    #[tokio::test]
    async fn access_and_refresh_tokens_have_distinct_ids() -> Result<(), Error> {
        let service = local_only_service();
        let pair = service.issue_pair(Ulid::new(), &[]).await?;

        let access = service.validate(&pair.access_token).await?;
        let refresh = service.validate(&pair.refresh_token).await?;
        assert_ne!(access.jti, refresh.jti);
        assert!(refresh.exp > access.exp);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_token_fails_validation() -> Result<(), Error> {
        let service = local_only_service();
        let pair = service.issue_pair(Ulid::new(), &[]).await?;
        let claims = service.validate(&pair.access_token).await?;

        service.revoke(&claims.jti, Utc::now() + Duration::minutes(15));
        assert!(service.is_revoked(&claims.jti));
        assert!(matches!(
            service.validate(&pair.access_token).await,
            Err(Error::Revoked)
        ));

        // Revocation is idempotent.
        service.revoke(&claims.jti, Utc::now() + Duration::minutes(15));
        assert!(service.is_revoked(&claims.jti));
        Ok(())
    }

    #[tokio::test]
    async fn expired_blacklist_entries_are_inert_and_purged() {
        let service = local_only_service();
        service.revoke("stale", Utc::now() - Duration::minutes(1));
        assert!(!service.is_revoked("stale"));

        // The next write sweeps the dead entry out.
        service.revoke("fresh", Utc::now() + Duration::minutes(5));
        assert_eq!(service.lock_blacklist().len(), 1);
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() -> Result<(), Error> {
        let service = local_only_service();
        let pair = service.issue_pair(Ulid::new(), &[]).await?;
        let mut tampered = pair.access_token.clone();
        tampered.truncate(tampered.len() - 4);
        tampered.push_str("AAAA");

        assert!(matches!(
            service.validate(&tampered).await,
            Err(Error::InvalidSignature)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn jwks_exports_the_active_key() -> Result<(), Error> {
        let service = local_only_service();
        let pair = service.issue_pair(Ulid::new(), &[]).await?;
        let kid = crate::jwt::rs256::peek_kid(&pair.access_token)?;

        let jwks = service.jwks().await?;
        assert!(jwks.find_by_kid(&kid).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn try_remote_without_remote_backend_fails() {
        let service = local_only_service();
        assert!(matches!(
            service.try_remote().await,
            Err(Error::InvalidClient)
        ));
    }
}
