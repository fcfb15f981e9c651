//! Vault transit client: the network half of the remote signing backend.
//!
//! Every failure is classified before it leaves this module so the
//! composite strategy can tell an outage (`InvalidClient`) from broken key
//! configuration (`InvalidKeyConfig`); nothing surfaces as a generic error.

use base64ct::{Base64, Encoding};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, instrument, Instrument};
use url::Url;

use crate::domain::Error;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Public key material for a transit key: PEM-encoded keys by version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitKeySet {
    pub latest_version: u32,
    pub keys: BTreeMap<u32, String>,
}

/// One signature produced by the transit engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitSignature {
    pub key_version: u32,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TransitClient {
    client: Client,
    url: String,
    token: SecretString,
    mount: String,
    key_name: String,
}

impl TransitClient {
    /// Build a client for one transit key. All requests are bounded by
    /// `timeout`; a timeout is reported as `InvalidClient`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the HTTP client cannot be constructed.
    pub fn new(
        url: String,
        token: SecretString,
        mount: String,
        key_name: String,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| {
                error!("Failed to build vault client: {}", err);
                Error::InvalidClient
            })?;

        Ok(Self {
            client,
            url,
            token,
            mount,
            key_name,
        })
    }

    /// Read the key's public material and latest version.
    ///
    /// # Errors
    ///
    /// `InvalidClient` on network/auth failure, `InvalidKeyConfig` when the
    /// response is missing expected fields.
    #[instrument(skip(self))]
    pub async fn read_key(&self) -> Result<TransitKeySet, Error> {
        let read_url =
            endpoint_url(&self.url, &format!("/v1/{}/keys/{}", self.mount, self.key_name))?;

        let span = tracing::info_span!("vault.read_key", http.method = "GET", url = %read_url);
        let response = self
            .client
            .get(&read_url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to read transit key: {}", err);
                Error::InvalidClient
            })?;

        let json_response = check_status(response).await?;

        let data = &json_response["data"];
        let latest_version = data["latest_version"]
            .as_u64()
            .ok_or(Error::InvalidKeyConfig)?;
        let latest_version = u32::try_from(latest_version).map_err(|_| Error::InvalidKeyConfig)?;

        let mut keys = BTreeMap::new();
        if let Some(map) = data["keys"].as_object() {
            for (version, entry) in map {
                let Ok(version) = version.parse::<u32>() else {
                    continue;
                };
                if let Some(public_key) = entry["public_key"].as_str() {
                    keys.insert(version, public_key.to_string());
                }
            }
        }

        if keys.is_empty() {
            error!("Transit key has no public key material");
            return Err(Error::InvalidKeyConfig);
        }

        Ok(TransitKeySet {
            latest_version,
            keys,
        })
    }

    /// Sign `input` with the given key version (RSA PKCS#1 v1.5, SHA-256,
    /// producing an RS256-compatible signature).
    ///
    /// # Errors
    ///
    /// `InvalidClient` on network/auth failure, `InvalidKeyConfig` when the
    /// response carries no usable signature.
    #[instrument(skip(self, input))]
    pub async fn sign(&self, key_version: u32, input: &[u8]) -> Result<TransitSignature, Error> {
        let sign_url =
            endpoint_url(&self.url, &format!("/v1/{}/sign/{}", self.mount, self.key_name))?;

        let payload = json!({
            "input": Base64::encode_string(input),
            "key_version": key_version,
            "hash_algorithm": "sha2-256",
            "signature_algorithm": "pkcs1v15",
        });

        let span = tracing::info_span!("vault.sign", http.method = "POST", url = %sign_url);
        let response = self
            .client
            .post(&sign_url)
            .header("X-Vault-Token", self.token.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to sign with transit key: {}", err);
                Error::InvalidClient
            })?;

        let json_response = check_status(response).await?;

        let signature = json_response["data"]["signature"]
            .as_str()
            .ok_or(Error::InvalidKeyConfig)?;

        parse_signature(signature)
    }

    /// Rotate the transit key to a new version.
    ///
    /// # Errors
    ///
    /// Returns `RotationFailed` on any failure; the cause is logged.
    #[instrument(skip(self))]
    pub async fn rotate(&self) -> Result<(), Error> {
        let rotate_url = endpoint_url(
            &self.url,
            &format!("/v1/{}/keys/{}/rotate", self.mount, self.key_name),
        )
        .map_err(|_| Error::RotationFailed)?;

        let span = tracing::info_span!("vault.rotate", http.method = "POST", url = %rotate_url);
        let response = self
            .client
            .post(&rotate_url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to rotate transit key: {}", err);
                Error::RotationFailed
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or_default();
            error!(
                "Failed to rotate transit key: {}, {}",
                status,
                vault_error_message(&json_response)
            );
            return Err(Error::RotationFailed);
        }

        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<Value, Error> {
    let status = response.status();
    if !status.is_success() {
        let json_response: Value = response.json().await.unwrap_or_default();
        let message = vault_error_message(&json_response);
        error!("Vault request failed: {}, {}", status, message);

        return Err(classify_status(status));
    }

    response.json().await.map_err(|err| {
        error!("Failed to parse vault response: {}", err);
        Error::InvalidKeyConfig
    })
}

fn classify_status(status: StatusCode) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::InvalidClient,
        _ => Error::InvalidKeyConfig,
    }
}

fn vault_error_message(json_response: &Value) -> &str {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Parse a transit signature of the form `vault:v<version>:<base64>`.
fn parse_signature(signature: &str) -> Result<TransitSignature, Error> {
    let mut parts = signature.splitn(3, ':');
    let prefix = parts.next().ok_or(Error::InvalidKeyConfig)?;
    let version = parts.next().ok_or(Error::InvalidKeyConfig)?;
    let encoded = parts.next().ok_or(Error::InvalidKeyConfig)?;

    if prefix != "vault" {
        return Err(Error::InvalidKeyConfig);
    }

    let key_version = version
        .strip_prefix('v')
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or(Error::InvalidKeyConfig)?;

    let signature = Base64::decode_vec(encoded).map_err(|_| Error::InvalidKeyConfig)?;

    Ok(TransitSignature {
        key_version,
        signature,
    })
}

/// # Errors
/// Returns `InvalidClient` if `url` cannot be parsed, has no host, or uses
/// an unsupported scheme.
pub fn endpoint_url(url: &str, path: &str) -> Result<String, Error> {
    let url = Url::parse(url).map_err(|err| {
        error!("Error parsing URL: {}", err);
        Error::InvalidClient
    })?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| {
            error!("Error parsing URL: no host specified");
            Error::InvalidClient
        })?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => {
                error!("Error parsing URL: unsupported scheme {}", scheme);
                return Err(Error::InvalidClient);
            }
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}
