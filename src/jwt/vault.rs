//! Remote signing backend: Vault transit. Holds no private key material;
//! signing happens inside Vault and only public keys are cached here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use std::sync::RwLock as StdRwLock;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::{Claims, Error};
use crate::jwt::jwks::{decode_public_key, Jwk, Jwks};
use crate::jwt::{rs256, SigningStrategy};
use crate::vault::{TransitClient, TransitKeySet};

const KEY_CACHE_TTL_SECONDS: u64 = 300;

struct CachedKeySet {
    keyset: TransitKeySet,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEY_CACHE_TTL_SECONDS)
    }
}

pub struct VaultStrategy {
    transit: TransitClient,
    key_name: String,
    cache: RwLock<Option<CachedKeySet>>,
    kid: StdRwLock<String>,
    last_rotation: StdRwLock<DateTime<Utc>>,
}

impl VaultStrategy {
    /// Initialize the strategy and probe the transit key once. A failed
    /// probe surfaces here so the caller can fall back to local-only
    /// signing instead of carrying a dead backend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` / `InvalidKeyConfig` from the initial probe.
    pub async fn new(transit: TransitClient, key_name: String) -> Result<Self, Error> {
        let strategy = Self {
            transit,
            key_name,
            cache: RwLock::new(None),
            kid: StdRwLock::new(String::new()),
            last_rotation: StdRwLock::new(Utc::now()),
        };

        strategy.refresh().await?;

        Ok(strategy)
    }

    fn kid_for_version(&self, version: u32) -> String {
        format!("{}-v{}", self.key_name, version)
    }

    /// Return cached key material, refreshing when stale. A failed refresh
    /// falls back to stale material when any exists so verification keeps
    /// working with the last known keys during an outage.
    async fn snapshot(&self) -> Result<TransitKeySet, Error> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.keyset.clone());
                }
            }
        }

        match self.refresh().await {
            Ok(keyset) => Ok(keyset),
            Err(err) => {
                let cache = self.cache.read().await;
                if let Some(cached) = cache.as_ref() {
                    warn!(
                        error = %err,
                        latest_version = cached.keyset.latest_version,
                        "using stale transit key cache"
                    );
                    Ok(cached.keyset.clone())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn refresh(&self) -> Result<TransitKeySet, Error> {
        let keyset = self.transit.read_key().await?;

        let kid = self.kid_for_version(keyset.latest_version);
        *self
            .kid
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = kid;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeySet {
            keyset: keyset.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keyset)
    }

    /// Export the latest and previous key versions, mirroring what a safe
    /// rotation needs: tokens signed by the previous key must keep
    /// verifying until they expire.
    fn build_jwks(&self, keyset: &TransitKeySet) -> Result<Jwks, Error> {
        let latest = keyset.latest_version;
        let previous = latest.checked_sub(1).filter(|v| *v >= 1);

        let mut keys = Vec::new();
        for version in [Some(latest), previous].into_iter().flatten() {
            let Some(pem) = keyset.keys.get(&version) else {
                continue;
            };
            let public_key = decode_public_key(pem.as_bytes())?;
            keys.push(Jwk::from_rsa_public_key(
                &public_key,
                self.kid_for_version(version),
            ));
        }

        if keys.is_empty() {
            return Err(Error::InvalidKeyConfig);
        }

        Ok(Jwks { keys })
    }
}

#[async_trait]
impl SigningStrategy for VaultStrategy {
    async fn sign(&self, claims: &Claims) -> Result<String, Error> {
        let keyset = self.snapshot().await?;
        let key_version = keyset.latest_version;
        let kid = self.kid_for_version(key_version);

        let signing_input = rs256::encode_signing_input(&kid, claims)?;
        let signature = self
            .transit
            .sign(key_version, signing_input.as_bytes())
            .await?;

        if signature.key_version != key_version {
            warn!(
                expected = key_version,
                got = signature.key_version,
                "vault signed with an unexpected key version"
            );
            return Err(Error::InvalidKeyConfig);
        }

        Ok(rs256::assemble(&signing_input, &signature.signature))
    }

    async fn verify(&self, token: &str) -> Result<Claims, Error> {
        let keyset = self.snapshot().await?;
        let mut jwks = self.build_jwks(&keyset)?;

        // A token signed moments after a rotation may name a version the
        // cache has not seen yet; refresh once before giving up.
        let kid = rs256::peek_kid(token)?;
        if jwks.find_by_kid(&kid).is_none() {
            let keyset = self.refresh().await?;
            jwks = self.build_jwks(&keyset)?;
        }

        rs256::verify(token, &jwks, Utc::now().timestamp())
    }

    async fn public_key(&self) -> Option<RsaPublicKey> {
        let keyset = self.snapshot().await.ok()?;
        let pem = keyset.keys.get(&keyset.latest_version)?;
        decode_public_key(pem.as_bytes()).ok()
    }

    fn key_id(&self) -> String {
        self.kid
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    async fn rotate_key(&self) -> Result<(), Error> {
        self.transit.rotate().await?;

        // Pick up the new version immediately so freshly signed tokens
        // carry the right kid.
        self.refresh().await.map_err(|_| Error::RotationFailed)?;

        *self
            .last_rotation
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Utc::now();

        info!(kid = %self.key_id(), "rotated transit signing key");
        Ok(())
    }

    fn last_rotation(&self) -> DateTime<Utc> {
        *self
            .last_rotation
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn jwks(&self) -> Result<Jwks, Error> {
        let keyset = self.snapshot().await?;
        self.build_jwks(&keyset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn unreachable_transit() -> TransitClient {
        TransitClient::new(
            "http://127.0.0.1:1".to_string(),
            SecretString::from("token".to_string()),
            "transit/sigilo".to_string(),
            "jwt-signing-key".to_string(),
            Duration::from_millis(200),
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn new_fails_when_vault_is_unreachable() {
        let result = VaultStrategy::new(unreachable_transit(), "jwt-signing-key".to_string()).await;
        assert!(matches!(result, Err(Error::InvalidClient)));
    }
}
