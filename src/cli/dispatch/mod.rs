//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{sasl, ARG_ACCOUNTS, ARG_LISTEN};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen = matches
        .get_one::<SocketAddr>(ARG_LISTEN)
        .copied()
        .context("missing required argument: --listen")?;
    let accounts = matches
        .get_one::<String>(ARG_ACCOUNTS)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .context("missing required argument: --accounts")?;

    let sasl_opts = sasl::Options::parse(matches)?;

    Ok(Action::Server(Args {
        listen,
        accounts,
        config: sasl_opts.config(),
    }))
}
