//! Login authorization.
//!
//! Flow Overview:
//! 1) A mechanism resolves the authentication identity (authcid) and,
//!    optionally, an authorization identity (authzid) through the
//!    `*_can_login` helpers, which record canonical entity ids in the session.
//! 2) Once the mechanism reports success, `login_user` re-resolves both ids,
//!    rejects frozen accounts, checks impersonation rights when the ids
//!    differ, and enforces the concurrent login quota.
//! 3) Every rejection is audited with its reason; the peer only ever sees a
//!    generic failure.

use tracing::debug;

use super::config::SaslConfig;
use super::session::Session;
use super::source::SourceInfo;
use super::Backends;
use crate::directory::{Account, AccountDirectory, AuditLog, LoginHooks, PrivilegeCheck};

/// Impersonate any account.
pub const PRIV_IMPERSONATE_ANY: &str = "impersonate:any";
/// Followed by the target's oper class, e.g. `impersonate:class:user`.
pub const PRIV_IMPERSONATE_CLASS_PREFIX: &str = "impersonate:class:";
/// Followed by the target's account name.
pub const PRIV_IMPERSONATE_ENTITY_PREFIX: &str = "impersonate:entity:";

const DEFAULT_OPER_CLASS: &str = "user";

/// Why an authenticated session was not logged in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginRejection {
    #[error("authentication identity is unknown")]
    UnknownAuthcid,
    #[error("authorization identity is unknown")]
    UnknownAuthzid,
    #[error("account {0} is frozen")]
    Frozen(String),
    #[error("{requester} may not impersonate {target}")]
    ImpersonationDenied { requester: String, target: String },
    #[error("account {0} has too many logins")]
    TooManyLogins(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanLoginError {
    #[error("no account named {0}")]
    NoSuchAccount(String),
    #[error("login to {0} denied by hook")]
    Denied(String),
}

pub(crate) struct Authorizer<'a> {
    accounts: &'a dyn AccountDirectory,
    privileges: &'a dyn PrivilegeCheck,
    hooks: &'a dyn LoginHooks,
    audit: &'a dyn AuditLog,
    config: &'a SaslConfig,
}

impl<'a> Authorizer<'a> {
    pub(crate) fn new(backends: &'a Backends, config: &'a SaslConfig) -> Self {
        Self {
            accounts: backends.accounts.as_ref(),
            privileges: backends.privileges.as_ref(),
            hooks: backends.hooks.as_ref(),
            audit: backends.audit.as_ref(),
            config,
        }
    }

    fn source(&self, session: &Session) -> SourceInfo {
        session.source(self.config.hide_server_names())
    }

    pub(crate) fn authcid_can_login(
        &self,
        session: &mut Session,
        authcid: &str,
    ) -> Result<Account, CanLoginError> {
        let account = self
            .accounts
            .find_by_nick(authcid)
            .ok_or_else(|| CanLoginError::NoSuchAccount(authcid.to_string()))?;

        session.set_authceid(account.id.clone());

        // the hook already ran when the authzid resolved to the same account
        if session.authzeid() == Some(account.id.as_str()) {
            return Ok(account);
        }

        self.check_login_hook(session, account)
    }

    pub(crate) fn authzid_can_login(
        &self,
        session: &mut Session,
        authzid: &str,
    ) -> Result<Account, CanLoginError> {
        let account = self
            .accounts
            .find_by_nick(authzid)
            .ok_or_else(|| CanLoginError::NoSuchAccount(authzid.to_string()))?;

        session.set_authzeid(account.id.clone());

        if session.authceid() == Some(account.id.as_str()) {
            return Ok(account);
        }

        self.check_login_hook(session, account)
    }

    fn check_login_hook(&self, session: &Session, account: Account) -> Result<Account, CanLoginError> {
        let source = self.source(session);
        if self.hooks.user_can_login(&source, &account) {
            Ok(account)
        } else {
            self.audit.login(
                &source,
                &format!("failed LOGIN to {} (denied by hook)", account.name),
            );
            Err(CanLoginError::Denied(account.name))
        }
    }

    /// May `source` log in as `target`? First match wins.
    pub(crate) fn may_impersonate(&self, source: &Account, target: &Account) -> bool {
        if source.id == target.id {
            return true;
        }

        if self.privileges.has_priv(source, PRIV_IMPERSONATE_ANY) {
            return true;
        }

        let class = target.oper_class.as_deref().unwrap_or(DEFAULT_OPER_CLASS);
        if self
            .privileges
            .has_priv(source, &format!("{PRIV_IMPERSONATE_CLASS_PREFIX}{class}"))
        {
            return true;
        }

        if self
            .privileges
            .has_priv(source, &format!("{PRIV_IMPERSONATE_ENTITY_PREFIX}{}", target.name))
        {
            return true;
        }

        self.hooks.may_impersonate(source, target)
    }

    /// Decide whether an authenticated session may log in, returning the
    /// account that will be logged in.
    pub(crate) fn login_user(&self, session: &mut Session) -> Result<Account, LoginRejection> {
        let source_id = session
            .authceid()
            .map(ToString::to_string)
            .ok_or(LoginRejection::UnknownAuthcid)?;
        let Some(source_mu) = self.accounts.find_by_id(&source_id) else {
            debug!(uid = session.uid(), "authentication identity vanished before login");
            return Err(LoginRejection::UnknownAuthcid);
        };

        let target_mu = match session.authzeid().filter(|id| !id.is_empty()) {
            Some(target_id) => {
                let Some(target_mu) = self.accounts.find_by_id(target_id) else {
                    debug!(uid = session.uid(), "authorization identity vanished before login");
                    return Err(LoginRejection::UnknownAuthzid);
                };
                target_mu
            }
            None => {
                session.set_authzeid(source_id);
                source_mu.clone()
            }
        };

        let source = self.source(session);

        if source_mu.frozen {
            self.audit.login(
                &source,
                &format!("failed LOGIN to {} (frozen)", source_mu.name),
            );
            return Err(LoginRejection::Frozen(source_mu.name));
        }

        let impersonating = target_mu.id != source_mu.id;
        if impersonating {
            if !self.may_impersonate(&source_mu, &target_mu) {
                self.audit.login(
                    &source,
                    &format!(
                        "denied IMPERSONATE by {} to {}",
                        source_mu.name, target_mu.name
                    ),
                );
                return Err(LoginRejection::ImpersonationDenied {
                    requester: source_mu.name,
                    target: target_mu.name,
                });
            }

            if target_mu.frozen {
                self.audit.login(
                    &source,
                    &format!("failed LOGIN to {} (frozen)", target_mu.name),
                );
                return Err(LoginRejection::Frozen(target_mu.name));
            }
        }

        if target_mu.logins >= self.config.max_logins() {
            self.audit.login(
                &source,
                &format!("failed LOGIN to {} (too many logins)", target_mu.name),
            );
            return Err(LoginRejection::TooManyLogins(target_mu.name));
        }

        // the final LOGIN entry is written once the client is live
        session.need_log = true;

        // without persistent uids the login arrives in the burst
        if self.config.use_puid() {
            self.accounts.mark_pending_login(&target_mu);
        }

        if impersonating {
            self.audit.login(
                &source,
                &format!(
                    "allowed IMPERSONATE by {} to {}",
                    source_mu.name, target_mu.name
                ),
            );
        }

        Ok(target_mu)
    }
}
