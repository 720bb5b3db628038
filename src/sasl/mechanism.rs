//! Mechanism plugin contract.
//!
//! A mechanism is a named set of up to three behaviors: `start` when a client
//! selects it, `step` for every client packet after that, and `finish` when
//! the session is torn down. Per-session state lives in the session
//! (`Session::set_state`) and is never inspected by the engine.

use super::login::{Authorizer, CanLoginError};
use super::session::Session;
use crate::directory::Account;

/// Result of one mechanism behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send `challenge` (possibly empty) and wait for the next packet.
    More(Vec<u8>),
    /// Credentials verified; authorize the login.
    Done,
    Fail,
}

pub trait Mechanism: Send + Sync {
    /// Name advertised to clients, e.g. `PLAIN`. Matched case-sensitively.
    fn name(&self) -> &str;

    /// Called once when the client selects this mechanism.
    fn start(&self, _ctx: &mut MechanismContext<'_>) -> Step {
        Step::More(Vec::new())
    }

    /// Called with each decoded client packet; `data` is empty for `+`.
    fn step(&self, _ctx: &mut MechanismContext<'_>, _data: &[u8]) -> Step {
        Step::Fail
    }

    /// Release anything held in the session's mechanism state.
    fn finish(&self, _session: &mut Session) {}
}

/// What a mechanism may see and do while handling a session.
pub struct MechanismContext<'a> {
    session: &'a mut Session,
    authorizer: Authorizer<'a>,
}

impl<'a> MechanismContext<'a> {
    pub(crate) fn new(session: &'a mut Session, authorizer: Authorizer<'a>) -> Self {
        Self {
            session,
            authorizer,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &*self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut *self.session
    }

    /// Resolve the authentication identity (whose credentials are checked).
    ///
    /// # Errors
    /// Returns `CanLoginError` if the account does not exist or a hook
    /// refuses the login.
    pub fn authcid_can_login(&mut self, authcid: &str) -> Result<Account, CanLoginError> {
        self.authorizer.authcid_can_login(&mut *self.session, authcid)
    }

    /// Resolve the authorization identity (who will be logged in).
    ///
    /// # Errors
    /// Returns `CanLoginError` if the account does not exist or a hook
    /// refuses the login.
    pub fn authzid_can_login(&mut self, authzid: &str) -> Result<Account, CanLoginError> {
        self.authorizer.authzid_can_login(&mut *self.session, authzid)
    }
}
