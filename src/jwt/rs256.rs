//! RS256 codec: encode/sign/verify the compact JWT form used for both
//! access and refresh tokens. Key lookup during verification goes through
//! a [`Jwks`] so callers control which keys are trusted.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::{Claims, Error};
use crate::jwt::jwks::Jwks;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl TokenHeader {
    fn rs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value).map_err(|err| Error::Internal(err.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::TokenFormat)?;
    serde_json::from_slice(&bytes).map_err(|_| Error::TokenFormat)
}

/// Build the `header.claims` signing input for the given key id.
///
/// # Errors
///
/// Returns an error if the header or claims cannot be encoded as JSON.
pub fn encode_signing_input(kid: &str, claims: &Claims) -> Result<String, Error> {
    let header_b64 = b64e_json(&TokenHeader::rs256(kid))?;
    let claims_b64 = b64e_json(claims)?;
    Ok(format!("{header_b64}.{claims_b64}"))
}

/// Append a raw RS256 signature to a signing input, yielding the token.
#[must_use]
pub fn assemble(signing_input: &str, signature: &[u8]) -> String {
    let signature_b64 = Base64UrlUnpadded::encode_string(signature);
    format!("{signing_input}.{signature_b64}")
}

/// Sign claims with an in-process RSA private key.
///
/// # Errors
///
/// Returns an error if the claims cannot be encoded.
pub fn sign_with_key(
    private_key: &RsaPrivateKey,
    kid: &str,
    claims: &Claims,
) -> Result<String, Error> {
    let signing_input = encode_signing_input(kid, claims)?;
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    Ok(assemble(&signing_input, &signature.to_vec()))
}

/// Read the `kid` out of a token header without verifying anything.
///
/// # Errors
///
/// Returns `TokenFormat` if the token is not a three-part JWT with a
/// decodable header.
pub fn peek_kid(token: &str) -> Result<String, Error> {
    let header_b64 = token.split('.').next().ok_or(Error::TokenFormat)?;
    let header: TokenHeader = b64d_json(header_b64)?;
    Ok(header.kid)
}

/// Verify an RS256 token against a key set and return its claims.
///
/// # Errors
///
/// Returns:
/// - `TokenFormat` for malformed tokens or invalid base64/json,
/// - `UnknownKid` when the header names a key absent from `jwks`,
/// - `InvalidSignature` when the signature does not check out,
/// - `Expired` when the claims are past their expiry.
pub fn verify(token: &str, jwks: &Jwks, now_unix_seconds: i64) -> Result<Claims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(Error::InvalidSignature);
    }

    let jwk = jwks
        .find_by_kid(&header.kid)
        .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;

    let public_key = jwk.to_rsa_public_key()?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::TokenFormat)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: Claims = b64d_json(claims_b64)?;
    if claims.is_expired(now_unix_seconds) {
        return Err(Error::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::jwks::Jwk;
    use crate::jwt::testkey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPublicKey;

    const NOW: i64 = 1_700_000_000;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(testkey::TEST_PRIVATE_KEY_PEM).expect("test key parses")
    }

    fn test_jwks(kid: &str) -> Jwks {
        let public_key = RsaPublicKey::from(&test_key());
        Jwks {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid)],
        }
    }

    fn test_claims(jti: &str) -> Claims {
        Claims {
            sub: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            roles: vec!["user".to_string()],
            iat: NOW,
            exp: NOW + 900,
            jti: jti.to_string(),
        }
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<(), Error> {
        let key = test_key();
        let token = sign_with_key(&key, "k1", &test_claims("jti-1"))?;
        let verified = verify(&token, &test_jwks("k1"), NOW)?;
        assert_eq!(verified, test_claims("jti-1"));
        Ok(())
    }

    #[test]
    fn peek_kid_reads_header_without_keys() -> Result<(), Error> {
        let token = sign_with_key(&test_key(), "key-7", &test_claims("jti"))?;
        assert_eq!(peek_kid(&token)?, "key-7");
        Ok(())
    }

    #[test]
    fn rejects_expired_claims() -> Result<(), Error> {
        let token = sign_with_key(&test_key(), "k1", &test_claims("jti"))?;
        let result = verify(&token, &test_jwks("k1"), NOW + 901);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn rejects_unknown_kid() -> Result<(), Error> {
        let token = sign_with_key(&test_key(), "rotated-away", &test_claims("jti"))?;
        let result = verify(&token, &test_jwks("k1"), NOW);
        assert!(matches!(result, Err(Error::UnknownKid(kid)) if kid == "rotated-away"));
        Ok(())
    }

    #[test]
    fn rejects_tampered_payload() -> Result<(), Error> {
        let token = sign_with_key(&test_key(), "k1", &test_claims("jti"))?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&test_claims("forged"))?;
        parts[1] = &forged;
        let tampered = parts.join(".");
        let result = verify(&tampered, &test_jwks("k1"), NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        let jwks = test_jwks("k1");
        assert!(matches!(
            verify("not-a-token", &jwks, NOW),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            verify("a.b.c.d", &jwks, NOW),
            Err(Error::TokenFormat)
        ));
    }
}
