//! Runtime configuration assembled from CLI/env arguments and validated
//! before anything starts.

use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::path::PathBuf;

const MIN_RSA_KEY_SIZE: usize = 2048;

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub url: String,
    pub token: SecretString,
    pub mount: String,
    pub key_name: String,
    pub timeout_seconds: u64,
    pub retry_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres DSN; in-memory stores are used when absent (local dev).
    pub dsn: Option<String>,
    pub rsa_key_size: usize,
    pub key_path: Option<PathBuf>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub verification_code_ttl_seconds: i64,
    pub reset_code_ttl_seconds: i64,
    pub vault: Option<VaultConfig>,
}

impl Config {
    /// Build the configuration from parsed CLI matches.
    ///
    /// # Errors
    ///
    /// Returns an error when required values are missing or validation
    /// fails.
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<Self> {
        let vault = match matches.get_one::<String>("vault-url") {
            Some(url) => {
                let token = matches
                    .get_one::<String>("vault-token")
                    .ok_or_else(|| anyhow!("missing required argument: --vault-token"))?;
                Some(VaultConfig {
                    url: url.clone(),
                    token: SecretString::from(token.clone()),
                    mount: matches
                        .get_one::<String>("vault-mount")
                        .cloned()
                        .unwrap_or_else(|| "transit/sigilo".to_string()),
                    key_name: matches
                        .get_one::<String>("vault-key")
                        .cloned()
                        .unwrap_or_else(|| "jwt-signing-key".to_string()),
                    timeout_seconds: matches
                        .get_one::<u64>("vault-timeout")
                        .copied()
                        .unwrap_or(5),
                    retry_interval_seconds: matches
                        .get_one::<u64>("vault-retry-interval")
                        .copied()
                        .unwrap_or(60),
                })
            }
            None => None,
        };

        let config = Self {
            port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
            dsn: matches.get_one::<String>("dsn").cloned(),
            rsa_key_size: matches
                .get_one::<usize>("rsa-key-size")
                .copied()
                .unwrap_or(MIN_RSA_KEY_SIZE),
            key_path: matches.get_one::<String>("key-path").map(PathBuf::from),
            access_token_ttl_seconds: matches
                .get_one::<i64>("access-token-ttl")
                .copied()
                .unwrap_or(900),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>("refresh-token-ttl")
                .copied()
                .unwrap_or(86_400),
            verification_code_ttl_seconds: matches
                .get_one::<i64>("verification-code-ttl")
                .copied()
                .unwrap_or(86_400),
            reset_code_ttl_seconds: matches
                .get_one::<i64>("reset-code-ttl")
                .copied()
                .unwrap_or(3_600),
            vault,
        };

        config.validate()?;

        Ok(config)
    }

    /// Ensure configuration values are usable.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.rsa_key_size < MIN_RSA_KEY_SIZE {
            return Err(anyhow!(
                "rsa-key-size must be at least {MIN_RSA_KEY_SIZE} bits: got {}",
                self.rsa_key_size
            ));
        }
        if self.access_token_ttl_seconds <= 0 {
            return Err(anyhow!("access-token-ttl must be positive"));
        }
        if self.refresh_token_ttl_seconds <= 0 {
            return Err(anyhow!("refresh-token-ttl must be positive"));
        }
        if self.refresh_token_ttl_seconds < self.access_token_ttl_seconds {
            return Err(anyhow!(
                "refresh-token-ttl must be at least the access token ttl"
            ));
        }
        if self.verification_code_ttl_seconds <= 0 {
            return Err(anyhow!("verification-code-ttl must be positive"));
        }
        if self.reset_code_ttl_seconds <= 0 {
            return Err(anyhow!("reset-code-ttl must be positive"));
        }
        if let Some(vault) = &self.vault {
            if vault.timeout_seconds == 0 {
                return Err(anyhow!("vault-timeout must be positive"));
            }
            if vault.retry_interval_seconds == 0 {
                return Err(anyhow!("vault-retry-interval must be positive"));
            }
        }
        Ok(())
    }
}
