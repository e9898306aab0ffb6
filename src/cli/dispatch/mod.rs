//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, resolving every
//! configuration group up front so malformed settings fail before the
//! server binds.

use crate::cli::actions::{
    server::{Args, SharedStoreKind},
    Action,
};
use crate::cli::commands::{auth, network, oauth, rate_limit, ARG_DSN, ARG_PORT, ARG_SHARED_STORE};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let shared_store = matches
        .get_one::<String>(ARG_SHARED_STORE)
        .map_or(Ok(SharedStoreKind::Postgres), |value| value.parse())?;

    let auth_opts = auth::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches)?;
    let network_opts = network::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        shared_store,
        jwt_secret: auth_opts.jwt_secret,
        jwt_issuer: auth_opts.issuer,
        jwt_audience: auth_opts.audience,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        token_leeway_seconds: auth_opts.leeway_seconds,
        cookie_secure: auth_opts.cookie_secure,
        google_client_id: oauth_opts.client_id,
        google_client_secret: oauth_opts.client_secret,
        google_redirect_uri: oauth_opts.redirect_uri,
        google_auth_uri: oauth_opts.auth_uri,
        google_token_uri: oauth_opts.token_uri,
        google_userinfo_uri: oauth_opts.userinfo_uri,
        oauth_timeout: oauth_opts.timeout,
        trusted_proxy_cidrs: network_opts.trusted_proxy_cidrs,
        guest_ip_hash_salt: network_opts.guest_ip_hash_salt,
        quotas: rate_limit::parse(matches),
    }))
}
