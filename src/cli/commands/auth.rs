use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_JWT_AUDIENCE: &str = "jwt-audience";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_TOKEN_LEEWAY_SECONDS: &str = "token-leeway-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub leeway_seconds: i64,
    pub cookie_secure: bool,
}

impl Options {
    /// Parse token and cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or a lifetime is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .context(format!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let positive = |id: &str| -> Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or_default();
            if value <= 0 {
                bail!("--{id} must be greater than zero");
            }
            Ok(value)
        };

        let leeway_seconds = matches
            .get_one::<i64>(ARG_TOKEN_LEEWAY_SECONDS)
            .copied()
            .unwrap_or_default();
        if leeway_seconds < 0 {
            bail!("--{ARG_TOKEN_LEEWAY_SECONDS} must not be negative");
        }

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            issuer: matches
                .get_one::<String>(ARG_JWT_ISSUER)
                .cloned()
                .unwrap_or_default(),
            audience: matches
                .get_one::<String>(ARG_JWT_AUDIENCE)
                .cloned()
                .unwrap_or_default(),
            access_ttl_seconds: positive(ARG_ACCESS_TTL_SECONDS)?,
            refresh_ttl_seconds: positive(ARG_REFRESH_TTL_SECONDS)?,
            leeway_seconds,
            cookie_secure: matches
                .get_one::<bool>(ARG_COOKIE_SECURE)
                .copied()
                .unwrap_or(true),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Base64 HMAC key for signing tokens (at least 32 bytes)")
                .env("VOCAWIK_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer (iss) stamped on and required of every token")
                .env("VOCAWIK_JWT_ISSUER")
                .default_value("vocawik"),
        )
        .arg(
            Arg::new(ARG_JWT_AUDIENCE)
                .long(ARG_JWT_AUDIENCE)
                .help("Audience (aud) stamped on and required of every token")
                .env("VOCAWIK_JWT_AUDIENCE")
                .default_value("vocawik-api"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("VOCAWIK_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh token lifetime in seconds")
                .env("VOCAWIK_REFRESH_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_TOKEN_LEEWAY_SECONDS)
                .long(ARG_TOKEN_LEEWAY_SECONDS)
                .help("Clock skew tolerated when checking exp and iat")
                .env("VOCAWIK_TOKEN_LEEWAY_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark auth cookies Secure")
                .env("VOCAWIK_COOKIE_SECURE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}
