use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::client_ip::DEFAULT_TRUSTED_PROXY_CIDRS;

pub const ARG_TRUSTED_PROXY_CIDRS: &str = "trusted-proxy-cidrs";
pub const ARG_GUEST_IP_HASH_SALT: &str = "guest-ip-hash-salt";

#[derive(Debug, Clone)]
pub struct Options {
    pub trusted_proxy_cidrs: String,
    pub guest_ip_hash_salt: SecretString,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            trusted_proxy_cidrs: matches
                .get_one::<String>(ARG_TRUSTED_PROXY_CIDRS)
                .cloned()
                .unwrap_or_else(|| DEFAULT_TRUSTED_PROXY_CIDRS.to_string()),
            guest_ip_hash_salt: SecretString::from(
                matches
                    .get_one::<String>(ARG_GUEST_IP_HASH_SALT)
                    .cloned()
                    .unwrap_or_default(),
            ),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUSTED_PROXY_CIDRS)
                .long(ARG_TRUSTED_PROXY_CIDRS)
                .help("Comma-separated CIDRs whose X-Forwarded-For header is trusted")
                .env("VOCAWIK_TRUSTED_PROXY_CIDRS")
                .default_value(DEFAULT_TRUSTED_PROXY_CIDRS),
        )
        .arg(
            Arg::new(ARG_GUEST_IP_HASH_SALT)
                .long(ARG_GUEST_IP_HASH_SALT)
                .help("Salt mixed into the guest IP hash")
                .env("VOCAWIK_GUEST_IP_HASH_SALT")
                .hide_env_values(true)
                .default_value(""),
        )
}
