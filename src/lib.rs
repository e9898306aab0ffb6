//! # Vocawik (Session Security Core)
//!
//! `vocawik` authenticates callers of a web API and keeps their sessions safe.
//!
//! ## Credentials
//!
//! Short-lived access tokens and long-lived refresh tokens are HS256-signed
//! JWTs bound to one issuer and audience. Refresh tokens belong to a *family*
//! started at login; each refresh token is single-use and rotating it yields a
//! successor in the same family.
//!
//! ## Reuse Detection
//!
//! Presenting a refresh token a second time revokes its whole family, so a
//! stolen token and its legitimate twin both stop working. Used and revoked
//! markers live in a shared key-value store with TTLs, which makes the
//! check-and-consume step safe across instances.
//!
//! ## Login
//!
//! OAuth authorization-code login (Google) is protected by a CSRF state
//! carried in a short-lived cookie. The provider profile is mapped to a local
//! user (linking by normalised email) inside one transaction.
//!
//! ## Abuse Controls
//!
//! Guarded routes use a fixed-window rate limiter keyed by method, path and
//! actor; it fails closed when the counter store is unavailable. Client IPs
//! honour `X-Forwarded-For` only from trusted proxy ranges, and anonymous
//! callers on opt-in routes get a durable guest identity keyed by a salted IP
//! hash.

pub mod api;
pub mod cli;
pub mod client_ip;
pub mod clock;
pub mod csrf;
pub(crate) mod db;
pub mod error;
pub mod guest;
pub mod identity;
pub mod oauth;
pub mod principal;
pub mod rate_limit;
pub mod rotation;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
