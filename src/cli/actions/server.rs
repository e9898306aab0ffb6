use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    api::{self, ApiConfig, AppState},
    cli::telemetry,
    client_ip::ClientIpResolver,
    clock::{SystemClock, UuidGenerator},
    guest::{GuestResolver, PgGuestStore},
    identity::PgIdentityStore,
    oauth::{GoogleOAuthClient, GoogleOAuthConfig, OAuthLogin},
    rate_limit::{RateLimitQuotas, RateLimiter},
    rotation::RefreshRotation,
    store::{MemoryStore, PgSharedStore, SharedStore},
    token::{TokenCodec, TokenSettings},
};

const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Where rotation markers and rate-limit counters live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharedStoreKind {
    Postgres,
    Memory,
}

impl FromStr for SharedStoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown shared store: {other}")),
        }
    }
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub shared_store: SharedStoreKind,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub token_leeway_seconds: i64,
    pub cookie_secure: bool,
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub google_redirect_uri: String,
    pub google_auth_uri: String,
    pub google_token_uri: String,
    pub google_userinfo_uri: String,
    pub oauth_timeout: Duration,
    pub trusted_proxy_cidrs: String,
    pub guest_ip_hash_salt: SecretString,
    pub quotas: RateLimitQuotas,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let codec = TokenCodec::new(
        &args.jwt_secret,
        TokenSettings {
            issuer: args.jwt_issuer,
            audience: args.jwt_audience,
            access_ttl_seconds: args.access_ttl_seconds,
            refresh_ttl_seconds: args.refresh_ttl_seconds,
            leeway_seconds: args.token_leeway_seconds,
        },
        Arc::new(SystemClock),
    )
    .context("Invalid token configuration")?;

    let shared: Arc<dyn SharedStore> = match args.shared_store {
        SharedStoreKind::Postgres => {
            let store = Arc::new(PgSharedStore::new(pool.clone()));
            spawn_purge(store.clone());
            store
        }
        SharedStoreKind::Memory => {
            warn!("Using the in-memory shared store; state is not shared between instances");
            let store = Arc::new(MemoryStore::new());
            let purge = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    interval.tick().await;
                    purge.purge_expired().await;
                }
            });
            store
        }
    };

    if args.google_client_id.is_empty() {
        warn!("Google OAuth client id is empty; logins will be refused by the provider");
    }
    let google = GoogleOAuthClient::new(
        GoogleOAuthConfig::new(
            args.google_client_id,
            args.google_client_secret,
            args.google_redirect_uri,
        )
        .with_endpoints(
            &args.google_auth_uri,
            &args.google_token_uri,
            &args.google_userinfo_uri,
        )
        .with_timeout(args.oauth_timeout),
    )
    .context("Invalid OAuth provider configuration")?;

    let ip_resolver = ClientIpResolver::from_cidrs(&args.trusted_proxy_cidrs);
    if ip_resolver.trusted_ranges().is_empty() {
        warn!("No trusted proxy ranges configured; X-Forwarded-For is ignored");
    }

    let rotation = Arc::new(RefreshRotation::new(
        Arc::new(codec),
        shared.clone(),
        Arc::new(UuidGenerator),
    ));

    let state = Arc::new(AppState {
        rotation: rotation.clone(),
        login: OAuthLogin::new(
            Arc::new(google),
            Arc::new(PgIdentityStore::new(pool.clone())),
            rotation,
        ),
        limiter: RateLimiter::new(shared),
        ip_resolver,
        guests: GuestResolver::new(
            Arc::new(PgGuestStore::new(pool)),
            args.guest_ip_hash_salt,
        ),
        config: ApiConfig::default()
            .with_cookie_secure(args.cookie_secure)
            .with_quotas(args.quotas),
    });

    debug!(quotas = ?state.config.quotas, "Rate limit quotas");
    info!(shared_store = ?args.shared_store, "Starting server");

    let result = api::serve(args.port, state).await;
    telemetry::shutdown_tracer();
    result
}

fn spawn_purge(store: Arc<PgSharedStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(purged) => debug!("Purged {purged} expired shared-store entries"),
                Err(err) => error!("Failed to purge expired shared-store entries: {err:#}"),
            }
        }
    });
}
