//! Server action: wire stores, signing strategies, services, background
//! tasks, and hand everything to the HTTP layer.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api;
use crate::auth::{AuthService, LogEmailSender, MfaDisabled};
use crate::cli::actions::Action;
use crate::cli::config::{Config, VaultConfig};
use crate::domain::{UserStore, VerificationCodeStore};
use crate::jwt::{
    CompositeStrategy, LocalStrategy, SigningStrategy, TokenIssuer, TokenService, VaultStrategy,
};
use crate::store::memory::{MemoryUserStore, MemoryVerificationCodeStore};
use crate::store::{PgUserStore, PgVerificationCodeStore};
use crate::vault::TransitClient;

const CODE_CLEANUP_INTERVAL_SECONDS: u64 = 3600;

/// Handle the server action.
///
/// # Errors
///
/// Returns an error if wiring or serving fails.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { config } => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    let (users, codes) = build_stores(&config).await?;

    let local = build_local_strategy(&config)?;
    let remote = match &config.vault {
        Some(vault) => init_remote(vault).await,
        None => None,
    };

    let strategy = CompositeStrategy::new(remote, Arc::new(local));
    let token_service = Arc::new(TokenService::new(
        strategy,
        chrono::Duration::seconds(config.access_token_ttl_seconds),
        chrono::Duration::seconds(config.refresh_token_ttl_seconds),
    ));
    let tokens: Arc<dyn TokenIssuer> = token_service.clone();

    let auth = Arc::new(AuthService::new(
        users,
        codes.clone(),
        tokens.clone(),
        Arc::new(LogEmailSender),
        Arc::new(MfaDisabled),
        chrono::Duration::seconds(config.verification_code_ttl_seconds),
        chrono::Duration::seconds(config.reset_code_ttl_seconds),
    ));

    spawn_code_cleanup(codes);
    if let Some(vault) = &config.vault {
        spawn_remote_recovery(token_service, vault.retry_interval_seconds);
    }

    api::serve(config.port, auth, tokens).await
}

async fn build_stores(
    config: &Config,
) -> Result<(Arc<dyn UserStore>, Arc<dyn VerificationCodeStore>)> {
    match &config.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;

            Ok((
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgVerificationCodeStore::new(pool)),
            ))
        }
        None => {
            warn!("No DSN configured, using in-memory stores");
            Ok((
                Arc::new(MemoryUserStore::new()),
                Arc::new(MemoryVerificationCodeStore::new()),
            ))
        }
    }
}

fn build_local_strategy(config: &Config) -> Result<LocalStrategy> {
    match &config.key_path {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file {}", path.display()))?;
            let strategy = LocalStrategy::from_pem(&pem, config.rsa_key_size)
                .with_context(|| format!("Failed to parse key file {}", path.display()))?;
            info!(path = %path.display(), "loaded local signing key");
            Ok(strategy)
        }
        None => {
            info!(bits = config.rsa_key_size, "generating local signing key");
            Ok(LocalStrategy::generate(config.rsa_key_size)?)
        }
    }
}

/// Initialization failure is not fatal: signing falls back to the local
/// key and the recovery probe keeps trying to promote the remote backend.
async fn init_remote(vault: &VaultConfig) -> Option<Arc<dyn SigningStrategy>> {
    let client = match TransitClient::new(
        vault.url.clone(),
        vault.token.clone(),
        vault.mount.clone(),
        vault.key_name.clone(),
        Duration::from_secs(vault.timeout_seconds),
    ) {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "Failed to build vault client, signing locally");
            return None;
        }
    };

    match VaultStrategy::new(client, vault.key_name.clone()).await {
        Ok(strategy) => Some(Arc::new(strategy)),
        Err(err) => {
            warn!(error = %err, "Failed to initialize remote signing, signing locally");
            None
        }
    }
}

fn spawn_code_cleanup(codes: Arc<dyn VerificationCodeStore>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(CODE_CLEANUP_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            if let Err(err) = codes.delete_expired(Utc::now()).await {
                warn!(error = %err, "expired code cleanup failed");
            }
        }
    });
}

fn spawn_remote_recovery(service: Arc<TokenService>, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            interval.tick().await;
            if service.remote_active().await {
                continue;
            }
            match service.try_remote().await {
                Ok(()) => info!("remote signing backend recovered"),
                Err(err) => debug!(error = %err, "remote signing still unavailable"),
            }
        }
    });
}
