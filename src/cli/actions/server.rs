use crate::directory::MemoryDirectory;
use crate::sasl::{Backends, SaslConfig, SaslServ};
use crate::uplink::{self, ChannelUplink};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug)]
pub struct Args {
    pub listen: SocketAddr,
    pub accounts: PathBuf,
    pub config: SaslConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the account file cannot be loaded or the listener
/// cannot be bound.
pub async fn execute(args: Args) -> Result<()> {
    let directory = Arc::new(
        MemoryDirectory::load(&args.accounts)
            .with_context(|| format!("Could not load accounts from {}", args.accounts.display()))?,
    );
    log_startup_args(&args, directory.len());

    let uplink = Arc::new(ChannelUplink::new());
    let backends = Backends::new(uplink.clone(), directory.clone(), directory);
    let engine = SaslServ::new(args.config, backends);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Could not listen on {}", args.listen))?;

    let mut engine = uplink::serve(listener, engine, uplink, shutdown_signal()).await?;

    info!("shutting down");
    let names: Vec<String> = engine.mechanisms().names().map(ToString::to_string).collect();
    for name in names {
        engine.unregister_mechanism(&name);
    }
    engine.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}

fn log_startup_args(args: &Args, accounts: usize) {
    let entries = [
        ("listen", args.listen.to_string()),
        ("accounts", format!("{} ({accounts} loaded)", args.accounts.display())),
        ("hide_server_names", args.config.hide_server_names().to_string()),
        ("max_logins", args.config.max_logins().to_string()),
        ("use_puid", args.config.use_puid().to_string()),
        (
            "stale_interval",
            format!("{}s", args.config.stale_interval().as_secs()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} - {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        message.push_str(&format!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
