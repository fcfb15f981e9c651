use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::domain::Error;

/// Public key set exported for external key-discovery consumers. Carries
/// the active key and the most recently rotated one, keyed by `kid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Serialize this JWKS to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Find a key by `kid` (Key ID).
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey`.
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n,
            e,
        }
    }

    /// Convert this JWK back to an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyConfig` if the base64url values cannot be decoded
    /// or the modulus/exponent do not form a valid RSA key.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        let n_bytes =
            Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::InvalidKeyConfig)?;
        let e_bytes =
            Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::InvalidKeyConfig)?;
        let n = BigUint::from_bytes_be(&n_bytes);
        let e = BigUint::from_bytes_be(&e_bytes);
        RsaPublicKey::new(n, e).map_err(|_| Error::InvalidKeyConfig)
    }
}

/// Parse an RSA public key from PEM or DER bytes.
///
/// # Errors
///
/// Returns `InvalidKeyConfig` if the bytes parse as neither SPKI nor PKCS#1.
pub fn decode_public_key(pem_or_der: &[u8]) -> Result<RsaPublicKey, Error> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| Error::InvalidKeyConfig)?;
        if let Ok(k) = RsaPublicKey::from_public_key_pem(s) {
            return Ok(k);
        }
        if let Ok(k) = RsaPublicKey::from_pkcs1_pem(s) {
            return Ok(k);
        }
        return Err(Error::InvalidKeyConfig);
    }

    if let Ok(k) = RsaPublicKey::from_public_key_der(pem_or_der) {
        return Ok(k);
    }
    if let Ok(k) = RsaPublicKey::from_pkcs1_der(pem_or_der) {
        return Ok(k);
    }
    Err(Error::InvalidKeyConfig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPrivateKey;

    fn test_public_key() -> RsaPublicKey {
        let private_key = RsaPrivateKey::from_pkcs8_pem(crate::jwt::testkey::TEST_PRIVATE_KEY_PEM)
            .expect("test key parses");
        RsaPublicKey::from(&private_key)
    }

    #[test]
    fn jwk_round_trips_to_rsa_public_key() {
        let public_key = test_public_key();
        let jwk = Jwk::from_rsa_public_key(&public_key, "k1");
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        let recovered = jwk.to_rsa_public_key().expect("jwk converts back");
        assert_eq!(recovered, public_key);
    }

    #[test]
    fn find_by_kid_matches_exactly() {
        let public_key = test_public_key();
        let jwks = Jwks {
            keys: vec![
                Jwk::from_rsa_public_key(&public_key, "k1"),
                Jwk::from_rsa_public_key(&public_key, "k2"),
            ],
        };
        assert_eq!(jwks.find_by_kid("k2").map(|k| k.kid.as_str()), Some("k2"));
        assert!(jwks.find_by_kid("k3").is_none());
    }

    #[test]
    fn to_rsa_public_key_rejects_bad_base64() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            alg: None,
            key_use: None,
            kid: "k".to_string(),
            n: "!!!".to_string(),
            e: "AQAB".to_string(),
        };
        assert!(matches!(
            jwk.to_rsa_public_key(),
            Err(Error::InvalidKeyConfig)
        ));
    }

    #[test]
    fn decode_public_key_rejects_garbage() {
        assert!(matches!(
            decode_public_key(b"-----BEGIN nonsense-----"),
            Err(Error::InvalidKeyConfig)
        ));
        assert!(matches!(
            decode_public_key(&[0u8; 16]),
            Err(Error::InvalidKeyConfig)
        ));
    }
}
