//! Line-based uplink to the IRC network.
//!
//! The daemon accepts one uplink connection at a time. Inbound lines are
//! parsed into engine events; outbound [`Outbound`] replies are queued on a
//! channel drained by a writer task. Uplink lines and reaper ticks share one
//! `select!` loop that owns the engine.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sasl::{Outbound, ProtocolError, SaslMessage, SaslServ};

/// Where the engine sends its replies.
pub trait Uplink: Send + Sync {
    fn send(&self, message: Outbound);

    /// Whether anything is listening; broadcasts are skipped otherwise.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Uplink backed by the current connection's writer channel.
#[derive(Debug, Default)]
pub struct ChannelUplink {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelUplink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, tx: mpsc::UnboundedSender<String>) {
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    pub fn detach(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl Uplink for ChannelUplink {
    fn send(&self, message: Outbound) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(message.to_string()).is_err() {
                    debug!(%message, "uplink writer is gone, dropping line");
                }
            }
            None => debug!(%message, "no uplink, dropping line"),
        }
    }

    fn is_connected(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

/// One parsed uplink line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Sasl(SaslMessage),
    /// A `SASL` line the engine cannot use; the addressed session is aborted.
    MalformedSasl { uid: String, error: ProtocolError },
    EndOfBurst { server: String },
    UserIntroduced { uid: String },
    Privmsg {
        from: String,
        target: String,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("empty line")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0} is missing parameters")]
    MissingParams(&'static str),
}

/// Split a line into its parameters; text after ` :` is one parameter.
fn params(line: &str) -> Vec<&str> {
    let (head, trailing) = match line.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (line, None),
    };
    head.split_whitespace().chain(trailing).collect()
}

/// Parse one inbound uplink line.
///
/// # Errors
/// Returns `LineError` for empty lines, unknown commands, or lines too short
/// to name their target.
pub fn parse_line(line: &str) -> Result<Inbound, LineError> {
    let params = params(line.trim_end_matches(['\r', '\n']));
    let (command, rest) = params.split_first().ok_or(LineError::Empty)?;

    match *command {
        "SASL" => {
            let [server, uid, mode, args @ ..] = rest else {
                return Err(LineError::MissingParams("SASL"));
            };
            Ok(match SaslMessage::parse(server, uid, mode, args) {
                Ok(message) => Inbound::Sasl(message),
                Err(error) => Inbound::MalformedSasl {
                    uid: (*uid).to_string(),
                    error,
                },
            })
        }
        "EOB" => {
            let [server, ..] = rest else {
                return Err(LineError::MissingParams("EOB"));
            };
            Ok(Inbound::EndOfBurst {
                server: (*server).to_string(),
            })
        }
        "UID" => {
            let [uid, ..] = rest else {
                return Err(LineError::MissingParams("UID"));
            };
            Ok(Inbound::UserIntroduced {
                uid: (*uid).to_string(),
            })
        }
        "PRIVMSG" => {
            let [from, target, text, ..] = rest else {
                return Err(LineError::MissingParams("PRIVMSG"));
            };
            Ok(Inbound::Privmsg {
                from: (*from).to_string(),
                target: (*target).to_string(),
                text: (*text).to_string(),
            })
        }
        other => Err(LineError::UnknownCommand(other.to_string())),
    }
}

/// Feed one inbound event to the engine.
pub fn apply(engine: &mut SaslServ, inbound: Inbound) {
    match inbound {
        Inbound::Sasl(message) => engine.sasl_input(message),
        Inbound::MalformedSasl { uid, error } => engine.reject_malformed(&uid, &error),
        Inbound::EndOfBurst { server } => engine.server_eob(&server),
        Inbound::UserIntroduced { uid } => engine.user_introduced(&uid),
        Inbound::Privmsg { from, target, text } => engine.handle_privmsg(&from, &target, &text),
    }
}

async fn next_line(reader: &mut Option<Lines<BufReader<OwnedReadHalf>>>) -> io::Result<Option<String>> {
    match reader {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Run the daemon loop until `shutdown` resolves, then hand the engine back.
///
/// # Errors
/// Returns an error if accepting a connection fails.
pub async fn serve<F>(
    listener: TcpListener,
    mut engine: SaslServ,
    uplink: Arc<ChannelUplink>,
    shutdown: F,
) -> io::Result<SaslServ>
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(engine.config().stale_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    let mut reader: Option<Lines<BufReader<OwnedReadHalf>>> = None;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => engine.reap_stale(),
            accepted = listener.accept(), if reader.is_none() => {
                let (stream, peer) = accepted?;
                info!(%peer, "uplink connected");

                let (read_half, mut write_half) = stream.into_split();
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                tokio::spawn(async move {
                    while let Some(line) = rx.recv().await {
                        if let Err(err) = write_half.write_all(format!("{line}\r\n").as_bytes()).await {
                            warn!(error = %err, "failed to write to uplink");
                            break;
                        }
                    }
                });

                uplink.attach(tx);
                reader = Some(BufReader::new(read_half).lines());
            }
            line = next_line(&mut reader), if reader.is_some() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(inbound) => apply(&mut engine, inbound),
                    Err(LineError::Empty) => {}
                    Err(err) => debug!(error = %err, line, "ignoring uplink line"),
                },
                Ok(None) => {
                    info!("uplink closed the connection");
                    uplink.detach();
                    reader = None;
                }
                Err(err) => {
                    warn!(error = %err, "uplink read failed");
                    uplink.detach();
                    reader = None;
                }
            },
        }
    }

    uplink.detach();
    Ok(engine)
}
