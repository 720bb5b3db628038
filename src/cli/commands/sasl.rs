use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::sasl::SaslConfig;

pub const ARG_HIDE_SERVER_NAMES: &str = "hide-server-names";
pub const ARG_MAX_LOGINS: &str = "max-logins";
pub const ARG_USE_PUID: &str = "use-puid";
pub const ARG_STALE_INTERVAL_SECONDS: &str = "stale-interval-seconds";

const DEFAULT_MAX_LOGINS: &str = "5";
const DEFAULT_STALE_INTERVAL_SECONDS: &str = "30";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub hide_server_names: bool,
    pub max_logins: usize,
    pub use_puid: bool,
    pub stale_interval_seconds: u64,
}

impl Options {
    /// Parse engine options from matches.
    ///
    /// # Errors
    /// Returns an error if a numeric option is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let max_logins = matches
            .get_one::<usize>(ARG_MAX_LOGINS)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_MAX_LOGINS}"))?;
        let stale_interval_seconds = matches
            .get_one::<u64>(ARG_STALE_INTERVAL_SECONDS)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_STALE_INTERVAL_SECONDS}")
            })?;

        Ok(Self {
            hide_server_names: matches.get_flag(ARG_HIDE_SERVER_NAMES),
            max_logins,
            use_puid: matches.get_flag(ARG_USE_PUID),
            stale_interval_seconds,
        })
    }

    #[must_use]
    pub fn config(&self) -> SaslConfig {
        SaslConfig::new()
            .with_hide_server_names(self.hide_server_names)
            .with_max_logins(self.max_logins)
            .with_use_puid(self.use_puid)
            .with_stale_interval_seconds(self.stale_interval_seconds)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HIDE_SERVER_NAMES)
                .long(ARG_HIDE_SERVER_NAMES)
                .help("Do not disclose server names in audit identities")
                .env("SASLSERV_HIDE_SERVER_NAMES")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_MAX_LOGINS)
                .long(ARG_MAX_LOGINS)
                .help("Maximum concurrent logins per account")
                .default_value(DEFAULT_MAX_LOGINS)
                .env("SASLSERV_MAX_LOGINS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_USE_PUID)
                .long(ARG_USE_PUID)
                .help("The uplink has no persistent client ids; expect logins in the burst")
                .env("SASLSERV_USE_PUID")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_STALE_INTERVAL_SECONDS)
                .long(ARG_STALE_INTERVAL_SECONDS)
                .help("Seconds between stale session sweeps")
                .long_help(
                    "Seconds between stale session sweeps. A session with no activity is reclaimed after one to two intervals.",
                )
                .default_value(DEFAULT_STALE_INTERVAL_SECONDS)
                .env("SASLSERV_STALE_INTERVAL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
