//! Ports to the services that own accounts, privileges, hooks and audit logs.
//!
//! The SASL engine never stores account data itself. It looks accounts up by
//! nickname or entity id, asks the privilege system for a yes/no answer, and
//! reports login outcomes back. Implementations must be cheap and
//! non-blocking: they run inline on the engine's event loop.

pub mod memory;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sasl::source::SourceInfo;

pub use memory::MemoryDirectory;

/// Snapshot of an account as seen by the SASL engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Canonical entity id; stable across renames.
    pub id: String,
    /// Account name, used in audit messages and as the login name.
    pub name: String,
    /// Set when the account carries a freeze marker.
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub cloak: Option<String>,
    #[serde(default)]
    pub oper_class: Option<String>,
    /// Registration not yet verified; the peer is not told about the login.
    #[serde(default)]
    pub wait_auth: bool,
    /// Number of clients currently logged in to this account.
    #[serde(default)]
    pub logins: usize,
}

/// Account lookup and mutation.
pub trait AccountDirectory: Send + Sync {
    fn find_by_nick(&self, nick: &str) -> Option<Account>;

    fn find_by_id(&self, id: &str) -> Option<Account>;

    /// Apply the account system's penalty for a failed credential check.
    fn bad_password(&self, source: &SourceInfo, account: &Account);

    /// Expect a burst login for this account (transports without persistent
    /// per-connection ids). Implementations also clear any "no burst login"
    /// marker on the account.
    fn mark_pending_login(&self, account: &Account);

    /// Log the now-live client `uid` in to `account`.
    fn login(&self, uid: &str, account: &Account);
}

/// Role/privilege predicate.
pub trait PrivilegeCheck: Send + Sync {
    fn has_priv(&self, account: &Account, privilege: &str) -> bool;
}

/// Extension points consulted while authorizing a login.
pub trait LoginHooks: Send + Sync {
    /// May `source` log in as `target`? Consulted after every built-in
    /// privilege check has failed.
    fn may_impersonate(&self, _source: &Account, _target: &Account) -> bool {
        false
    }

    /// May `account` log in at all?
    fn user_can_login(&self, _source: &SourceInfo, _account: &Account) -> bool {
        true
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoopLoginHooks;

impl LoginHooks for NoopLoginHooks {}

/// Sink for login audit entries.
pub trait AuditLog: Send + Sync {
    fn login(&self, source: &SourceInfo, message: &str);
}

/// Audit log that emits `tracing` events on the `saslserv::audit` target.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn login(&self, source: &SourceInfo, message: &str) {
        info!(target: "saslserv::audit", source = %source.full(), "{} {message}", source.name());
    }
}
