use anyhow::{bail, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::oauth::{GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, GOOGLE_USERINFO_URI};

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_REDIRECT_URI: &str = "google-redirect-uri";
pub const ARG_GOOGLE_AUTH_URI: &str = "google-auth-uri";
pub const ARG_GOOGLE_TOKEN_URI: &str = "google-token-uri";
pub const ARG_GOOGLE_USERINFO_URI: &str = "google-userinfo-uri";
pub const ARG_OAUTH_TIMEOUT_SECONDS: &str = "oauth-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub userinfo_uri: String,
    pub timeout: Duration,
}

impl Options {
    /// Parse OAuth provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the request timeout is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let timeout_seconds = matches
            .get_one::<u64>(ARG_OAUTH_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(5);
        if timeout_seconds == 0 {
            bail!("--{ARG_OAUTH_TIMEOUT_SECONDS} must be greater than zero");
        }

        Ok(Self {
            client_id: get(ARG_GOOGLE_CLIENT_ID),
            client_secret: SecretString::from(get(ARG_GOOGLE_CLIENT_SECRET)),
            redirect_uri: get(ARG_GOOGLE_REDIRECT_URI),
            auth_uri: get(ARG_GOOGLE_AUTH_URI),
            token_uri: get(ARG_GOOGLE_TOKEN_URI),
            userinfo_uri: get(ARG_GOOGLE_USERINFO_URI),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("VOCAWIK_GOOGLE_CLIENT_ID")
                .default_value(""),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("VOCAWIK_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true)
                .default_value(""),
        )
        .arg(
            Arg::new(ARG_GOOGLE_REDIRECT_URI)
                .long(ARG_GOOGLE_REDIRECT_URI)
                .help("Callback URL registered with Google")
                .env("VOCAWIK_GOOGLE_REDIRECT_URI")
                .default_value(""),
        )
        .arg(
            Arg::new(ARG_GOOGLE_AUTH_URI)
                .long(ARG_GOOGLE_AUTH_URI)
                .help("Google authorization endpoint")
                .env("VOCAWIK_GOOGLE_AUTH_URI")
                .default_value(GOOGLE_AUTH_URI),
        )
        .arg(
            Arg::new(ARG_GOOGLE_TOKEN_URI)
                .long(ARG_GOOGLE_TOKEN_URI)
                .help("Google token endpoint")
                .env("VOCAWIK_GOOGLE_TOKEN_URI")
                .default_value(GOOGLE_TOKEN_URI),
        )
        .arg(
            Arg::new(ARG_GOOGLE_USERINFO_URI)
                .long(ARG_GOOGLE_USERINFO_URI)
                .help("Google userinfo endpoint")
                .env("VOCAWIK_GOOGLE_USERINFO_URI")
                .default_value(GOOGLE_USERINFO_URI),
        )
        .arg(
            Arg::new(ARG_OAUTH_TIMEOUT_SECONDS)
                .long(ARG_OAUTH_TIMEOUT_SECONDS)
                .help("Timeout for each request to the OAuth provider")
                .env("VOCAWIK_OAUTH_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}
