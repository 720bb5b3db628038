use crate::cli::actions::{server, Action};
use crate::cli::telemetry;
use anyhow::Result;

/// Single dispatch point for every CLI action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Server(args) => server::execute(args).await,
    };

    telemetry::shutdown_tracer();
    result
}
