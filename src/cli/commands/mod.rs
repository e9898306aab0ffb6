pub mod auth;
pub mod logging;
pub mod network;
pub mod oauth;
pub mod rate_limit;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    builder::PossibleValuesParser,
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_SHARED_STORE: &str = "shared-store";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("vocawik")
        .about("Session security: OAuth login, refresh rotation, rate limiting")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("VOCAWIK_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("VOCAWIK_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SHARED_STORE)
                .long(ARG_SHARED_STORE)
                .help("Backend for rotation markers and rate-limit counters")
                .long_help(
                    "Backend for rotation markers and rate-limit counters. `postgres` is shared by every instance using the same database; `memory` is local to this process.",
                )
                .env("VOCAWIK_SHARED_STORE")
                .default_value("postgres")
                .value_parser(PossibleValuesParser::new(["postgres", "memory"])),
        );

    let command = auth::with_args(command);
    let command = oauth::with_args(command);
    let command = network::with_args(command);
    let command = rate_limit::with_args(command);
    logging::with_args(command)
}
