//! Inbound SASL relay events and outbound replies.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown SASL mode '{0}'")]
    UnknownMode(String),
    #[error("SASL {mode} message is missing its {field}")]
    MissingField { mode: char, field: &'static str },
}

/// One inbound event, addressed to the session of connection `uid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslMessage {
    pub uid: String,
    pub server: String,
    pub event: SaslEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslEvent {
    /// `H <host> <ip> [P|S]`
    Host { host: String, ip: String, tls: bool },
    /// `S <mechanism> [fingerprint]`
    Start {
        mechanism: String,
        certfp: Option<String>,
    },
    /// `C <data>`
    Data(String),
    /// `D`, the client gave up.
    Done,
}

impl SaslMessage {
    /// Build a message from a relayed mode letter and its parameters.
    ///
    /// # Errors
    /// Returns `ProtocolError` for unknown modes or missing required fields.
    pub fn parse(server: &str, uid: &str, mode: &str, params: &[&str]) -> Result<Self, ProtocolError> {
        let event = match mode {
            "H" => SaslEvent::Host {
                host: required(params, 0, 'H', "host")?,
                ip: required(params, 1, 'H', "ip")?,
                // plaintext only when explicitly flagged
                tls: params.get(2).is_some_and(|flag| *flag != "P"),
            },
            "S" => SaslEvent::Start {
                mechanism: required(params, 0, 'S', "mechanism")?,
                certfp: params.get(1).map(ToString::to_string),
            },
            "C" => SaslEvent::Data(required(params, 0, 'C', "data")?),
            "D" => SaslEvent::Done,
            other => return Err(ProtocolError::UnknownMode(other.to_string())),
        };

        Ok(Self {
            uid: uid.to_string(),
            server: server.to_string(),
            event,
        })
    }
}

fn required(
    params: &[&str],
    index: usize,
    mode: char,
    field: &'static str,
) -> Result<String, ProtocolError> {
    params
        .get(index)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or(ProtocolError::MissingField { mode, field })
}

/// A reply or notification sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// `C`: one continuation frame.
    Continue { target: String, data: String },
    /// `M`: unknown mechanism, with the current advertisement.
    Mechanisms { target: String, list: String },
    /// `D S` / `D F`
    Done { target: String, success: bool },
    /// Network-wide mechanism advertisement.
    Mechlist(String),
    /// Hand the login over to the client's server.
    SvsLogin {
        target: String,
        cloak: String,
        account: String,
    },
    Notice { target: String, text: String },
}

impl Outbound {
    /// Connection id this reply is addressed to, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Continue { target, .. }
            | Self::Mechanisms { target, .. }
            | Self::Done { target, .. }
            | Self::SvsLogin { target, .. }
            | Self::Notice { target, .. } => Some(target),
            Self::Mechlist(_) => None,
        }
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue { target, data } => write!(f, "SASL {target} C {data}"),
            Self::Mechanisms { target, list } => write!(f, "SASL {target} M {list}"),
            Self::Done { target, success } => {
                write!(f, "SASL {target} D {}", if *success { 'S' } else { 'F' })
            }
            Self::Mechlist(list) => write!(f, "MECHLIST {list}"),
            Self::SvsLogin {
                target,
                cloak,
                account,
            } => write!(f, "SVSLOGIN {target} {cloak} {account}"),
            Self::Notice { target, text } => write!(f, "NOTICE {target} :{text}"),
        }
    }
}
