use clap::{builder::ValueParser, Arg, ArgMatches, Command};

use crate::rate_limit::{Quota, RateLimitQuotas};

pub const ARG_RATE_LIMIT_AUTHORIZE: &str = "rate-limit-authorize";
pub const ARG_RATE_LIMIT_CALLBACK: &str = "rate-limit-callback";
pub const ARG_RATE_LIMIT_REFRESH: &str = "rate-limit-refresh";
pub const ARG_RATE_LIMIT_DEFAULT: &str = "rate-limit-default";

/// Accepts `requests/seconds`, e.g. `20/60`.
#[must_use]
pub fn validator_quota() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<Quota, String> {
        value.parse::<Quota>()
    })
}

#[must_use]
pub fn parse(matches: &ArgMatches) -> RateLimitQuotas {
    let defaults = RateLimitQuotas::default();
    let quota = |id: &str, fallback: Quota| {
        matches
            .get_one::<Quota>(id)
            .copied()
            .unwrap_or(fallback)
    };

    RateLimitQuotas {
        authorize: quota(ARG_RATE_LIMIT_AUTHORIZE, defaults.authorize),
        callback: quota(ARG_RATE_LIMIT_CALLBACK, defaults.callback),
        refresh: quota(ARG_RATE_LIMIT_REFRESH, defaults.refresh),
        default: quota(ARG_RATE_LIMIT_DEFAULT, defaults.default),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_AUTHORIZE)
                .long(ARG_RATE_LIMIT_AUTHORIZE)
                .help("Quota for OAuth authorize, as requests/seconds")
                .env("VOCAWIK_RATE_LIMIT_AUTHORIZE")
                .default_value("20/60")
                .value_parser(validator_quota()),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CALLBACK)
                .long(ARG_RATE_LIMIT_CALLBACK)
                .help("Quota for OAuth callback, as requests/seconds")
                .env("VOCAWIK_RATE_LIMIT_CALLBACK")
                .default_value("10/60")
                .value_parser(validator_quota()),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_REFRESH)
                .long(ARG_RATE_LIMIT_REFRESH)
                .help("Quota for token refresh, as requests/seconds")
                .env("VOCAWIK_RATE_LIMIT_REFRESH")
                .default_value("30/60")
                .value_parser(validator_quota()),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_DEFAULT)
                .long(ARG_RATE_LIMIT_DEFAULT)
                .help("Quota for other guarded routes, as requests/seconds")
                .env("VOCAWIK_RATE_LIMIT_DEFAULT")
                .default_value("60/60")
                .value_parser(validator_quota()),
        )
}
