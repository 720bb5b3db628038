//! # saslserv (SASL authentication for IRC network services)
//!
//! `saslserv` terminates SASL negotiations relayed by IRC servers, resolves
//! the negotiated credentials to network accounts and authorizes the login,
//! including impersonation by privileged accounts.
//!
//! ## Sessions
//!
//! One session exists per connecting client, keyed by the connection id the
//! relaying server assigned. A session commits to a single mechanism, is
//! aborted on the first error, and is reclaimed by a reaper after two quiet
//! ticks. A successful session stays alive until the client shows up on the
//! network, at which point the login is finalized.
//!
//! ## Mechanisms
//!
//! Mechanisms implement [`sasl::Mechanism`] and are registered at runtime;
//! the comma-separated list of registered names is broadcast to the network
//! whenever it changes.
//!
//! ## Collaborators
//!
//! Accounts, privileges, login hooks and the audit log are ports defined in
//! [`directory`]. The daemon uses the in-memory directory loaded from JSON.

pub mod cli;
pub mod directory;
pub mod sasl;
pub mod uplink;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Reported in CTCP VERSION replies and the startup banner.
pub const APP_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
