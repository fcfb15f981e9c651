//! Composite signing strategy with fall-back support.
//!
//! Wraps an optional remote backend and a mandatory local one behind a
//! single logical signing identity. Sign, rotate, and public-key reads
//! demote the remote backend on any failure; verify demotes only on
//! `InvalidClient` / `InvalidKeyConfig`, because most verify failures are
//! legitimate token rejections that must not mask the true cause.
//!
//! The active flag is read under a short read lock and never held across
//! remote I/O. Two requests may race to demote; redundant flips are
//! harmless, so the race is tolerated rather than prevented.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::{Claims, Error};
use crate::jwt::jwks::Jwks;
use crate::jwt::SigningStrategy;

pub struct CompositeStrategy {
    remote: Option<Arc<dyn SigningStrategy>>,
    local: Arc<dyn SigningStrategy>,
    use_remote: RwLock<bool>,
}

impl CompositeStrategy {
    #[must_use]
    pub fn new(remote: Option<Arc<dyn SigningStrategy>>, local: Arc<dyn SigningStrategy>) -> Self {
        let use_remote = remote.is_some();
        Self {
            remote,
            local,
            use_remote: RwLock::new(use_remote),
        }
    }

    /// Whether the remote backend is currently active.
    pub async fn remote_active(&self) -> bool {
        *self.use_remote.read().await && self.remote.is_some()
    }

    async fn active_remote(&self) -> Option<Arc<dyn SigningStrategy>> {
        let use_remote = { *self.use_remote.read().await };
        if use_remote {
            self.remote.clone()
        } else {
            None
        }
    }

    async fn demote(&self) {
        *self.use_remote.write().await = false;
    }

    /// Manual fail-back: probe the remote backend and re-activate it when
    /// it answers with a public key. Holds the exclusive lock for the full
    /// probe so the commit and the check cannot interleave with another
    /// recovery attempt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if no remote backend is configured or the
    /// probe yields no key; the flag is left unchanged on failure.
    pub async fn try_remote(&self) -> Result<(), Error> {
        let mut use_remote = self.use_remote.write().await;

        let Some(remote) = self.remote.as_ref() else {
            return Err(Error::InvalidClient);
        };

        if remote.public_key().await.is_none() {
            return Err(Error::InvalidClient);
        }

        *use_remote = true;
        info!("switched back to the remote signing backend");
        Ok(())
    }
}

#[async_trait]
impl SigningStrategy for CompositeStrategy {
    async fn sign(&self, claims: &Claims) -> Result<String, Error> {
        if let Some(remote) = self.active_remote().await {
            match remote.sign(claims).await {
                Ok(token) => return Ok(token),
                Err(err) => {
                    // Any signing failure from a live key-management
                    // service is worth demoting over.
                    warn!(error = %err, "remote sign failed, falling back to local signing");
                    self.demote().await;
                }
            }
        }
        self.local.sign(claims).await
    }

    async fn verify(&self, token: &str) -> Result<Claims, Error> {
        if let Some(remote) = self.active_remote().await {
            match remote.verify(token).await {
                Ok(claims) => return Ok(claims),
                Err(err) if err.is_backend_outage() => {
                    warn!(error = %err, "remote verify failed, falling back to local verification");
                    self.demote().await;
                }
                Err(err) => return Err(err),
            }
        }
        self.local.verify(token).await
    }

    async fn public_key(&self) -> Option<RsaPublicKey> {
        if let Some(remote) = self.active_remote().await {
            if let Some(key) = remote.public_key().await {
                return Some(key);
            }
            warn!("remote backend returned no public key, falling back to local signing");
            self.demote().await;
        }
        self.local.public_key().await
    }

    fn key_id(&self) -> String {
        // Flag reads must stay synchronous here; try_read only fails while
        // a writer holds the lock, and a demotion in flight means the
        // local key id is the honest answer anyway.
        let use_remote = self.use_remote.try_read().map(|guard| *guard).unwrap_or(false);
        if use_remote {
            if let Some(remote) = self.remote.as_ref() {
                return remote.key_id();
            }
        }
        self.local.key_id()
    }

    async fn rotate_key(&self) -> Result<(), Error> {
        if let Some(remote) = self.active_remote().await {
            match remote.rotate_key().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "remote rotation failed, falling back to local rotation");
                    self.demote().await;
                }
            }
        }
        self.local.rotate_key().await
    }

    fn last_rotation(&self) -> DateTime<Utc> {
        let use_remote = self.use_remote.try_read().map(|guard| *guard).unwrap_or(false);
        if use_remote {
            if let Some(remote) = self.remote.as_ref() {
                return remote.last_rotation();
            }
        }
        self.local.last_rotation()
    }

    async fn jwks(&self) -> Result<Jwks, Error> {
        if let Some(remote) = self.active_remote().await {
            match remote.jwks().await {
                Ok(jwks) => return Ok(jwks),
                Err(err) => {
                    warn!(error = %err, "remote key export failed, falling back to local keys");
                    self.demote().await;
                }
            }
        }
        self.local.jwks().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::jwks::Jwk;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_public_key() -> RsaPublicKey {
        let private_key =
            RsaPrivateKey::from_pkcs8_pem(crate::jwt::testkey::TEST_PRIVATE_KEY_PEM)
                .expect("test key parses");
        RsaPublicKey::from(&private_key)
    }

    /// Scripted backend: every operation either succeeds with a canned
    /// value or fails with a configured error kind.
    struct ScriptedStrategy {
        name: &'static str,
        sign_error: Option<fn() -> Error>,
        verify_error: Option<fn() -> Error>,
        has_public_key: bool,
        calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn healthy(name: &'static str) -> Self {
            Self {
                name,
                sign_error: None,
                verify_error: None,
                has_public_key: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn sign_failing(name: &'static str, error: fn() -> Error) -> Self {
            Self {
                sign_error: Some(error),
                ..Self::healthy(name)
            }
        }

        fn verify_failing(name: &'static str, error: fn() -> Error) -> Self {
            Self {
                verify_error: Some(error),
                ..Self::healthy(name)
            }
        }

        fn without_public_key(name: &'static str) -> Self {
            Self {
                has_public_key: false,
                ..Self::healthy(name)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SigningStrategy for ScriptedStrategy {
        async fn sign(&self, _claims: &Claims) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.sign_error {
                Some(error) => Err(error()),
                None => Ok(format!("token-from-{}", self.name)),
            }
        }

        async fn verify(&self, _token: &str) -> Result<Claims, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verify_error {
                Some(error) => Err(error()),
                None => Ok(Claims {
                    sub: self.name.to_string(),
                    roles: vec![],
                    iat: 0,
                    exp: i64::MAX,
                    jti: "jti".to_string(),
                }),
            }
        }

        async fn public_key(&self) -> Option<RsaPublicKey> {
            self.has_public_key.then(test_public_key)
        }

        fn key_id(&self) -> String {
            self.name.to_string()
        }

        async fn rotate_key(&self) -> Result<(), Error> {
            Ok(())
        }

        fn last_rotation(&self) -> DateTime<Utc> {
            Utc::now()
        }

        async fn jwks(&self) -> Result<Jwks, Error> {
            Ok(Jwks {
                keys: vec![Jwk::from_rsa_public_key(&test_public_key(), self.name)],
            })
        }
    }

    fn claims() -> Claims {
        Claims {
            sub: "user".to_string(),
            roles: vec![],
            iat: 0,
            exp: i64::MAX,
            jti: "jti".to_string(),
        }
    }

    #[tokio::test]
    async fn sign_prefers_remote_when_healthy() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::healthy("remote"));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote.clone()), local.clone());

        assert_eq!(composite.sign(&claims()).await?, "token-from-remote");
        assert!(composite.remote_active().await);
        assert_eq!(local.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn sign_failure_demotes_remote_permanently() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::sign_failing("remote", || {
            Error::InvalidClient
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote.clone()), local.clone());

        // First call falls through to local.
        assert_eq!(composite.sign(&claims()).await?, "token-from-local");
        assert!(!composite.remote_active().await);

        // Subsequent calls go straight to local without retrying remote.
        assert_eq!(composite.sign(&claims()).await?, "token-from-local");
        assert_eq!(remote.calls(), 1);
        assert_eq!(local.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn sign_fails_over_even_on_non_outage_errors() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::sign_failing("remote", || {
            Error::SigningFailed
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        assert_eq!(composite.sign(&claims()).await?, "token-from-local");
        assert!(!composite.remote_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn verify_outage_errors_demote_and_fall_back() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::verify_failing("remote", || {
            Error::InvalidKeyConfig
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        let verified = composite.verify("token").await?;
        assert_eq!(verified.sub, "local");
        assert!(!composite.remote_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn verify_bad_token_errors_return_unchanged_without_demotion() {
        let remote = Arc::new(ScriptedStrategy::verify_failing("remote", || {
            Error::InvalidSignature
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local.clone());

        let result = composite.verify("token").await;
        assert!(matches!(result, Err(Error::InvalidSignature)));
        assert!(composite.remote_active().await);
        assert_eq!(local.calls(), 0);

        // Expiry is a bad-token error too, not an outage.
        let remote = Arc::new(ScriptedStrategy::verify_failing("remote", || Error::Expired));
        let composite = CompositeStrategy::new(Some(remote), Arc::new(ScriptedStrategy::healthy("local")));
        assert!(matches!(composite.verify("token").await, Err(Error::Expired)));
        assert!(composite.remote_active().await);
    }

    #[tokio::test]
    async fn verify_uses_local_when_remote_absent() -> Result<(), Error> {
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(None, local);

        let verified = composite.verify("token").await?;
        assert_eq!(verified.sub, "local");
        Ok(())
    }

    #[tokio::test]
    async fn public_key_without_remote_key_demotes() {
        let remote = Arc::new(ScriptedStrategy::without_public_key("remote"));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        assert!(composite.public_key().await.is_some());
        assert!(!composite.remote_active().await);
    }

    #[tokio::test]
    async fn try_remote_without_backend_fails_and_keeps_state() {
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(None, local);

        assert!(matches!(
            composite.try_remote().await,
            Err(Error::InvalidClient)
        ));
        assert!(!composite.remote_active().await);
        assert_eq!(composite.key_id(), "local");
    }

    #[tokio::test]
    async fn try_remote_promotes_only_on_successful_probe() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::sign_failing("remote", || {
            Error::InvalidClient
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        composite.sign(&claims()).await?;
        assert!(!composite.remote_active().await);

        composite.try_remote().await?;
        assert!(composite.remote_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn try_remote_with_dead_probe_leaves_state_unchanged() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::without_public_key("remote"));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        // Demote via a public key read first.
        let _ = composite.public_key().await;
        assert!(!composite.remote_active().await);

        assert!(matches!(
            composite.try_remote().await,
            Err(Error::InvalidClient)
        ));
        assert!(!composite.remote_active().await);
        Ok(())
    }

    #[tokio::test]
    async fn key_id_follows_the_active_backend() -> Result<(), Error> {
        let remote = Arc::new(ScriptedStrategy::sign_failing("remote", || {
            Error::InvalidClient
        }));
        let local = Arc::new(ScriptedStrategy::healthy("local"));
        let composite = CompositeStrategy::new(Some(remote), local);

        assert_eq!(composite.key_id(), "remote");
        composite.sign(&claims()).await?;
        assert_eq!(composite.key_id(), "local");
        Ok(())
    }
}
