use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;
use tracing::Level;

/// `-v` count (or `SASLSERV_LOG_LEVEL`) to the default log level; zero keeps
/// the telemetry default (ERROR).
const fn verbosity_to_level(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse arguments, set up logging and return the action to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments do
/// not describe a runnable action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let count = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    telemetry::init(verbosity_to_level(count))?;

    dispatch::handler(&matches)
}
