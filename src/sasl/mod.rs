//! SASL session engine.
//!
//! Flow Overview:
//! 1) The uplink relays client events (`H`, `S`, `C`, `D`) keyed by the
//!    client's connection id; the engine checks the session out of the store.
//! 2) Complete packets drive the bound mechanism. The first packet is the
//!    mechanism name; later packets are base64 client data.
//! 3) A mechanism that reports `Done` hands the session to the login
//!    authorizer. On success the session waits for the client to appear on
//!    the network (`user_introduced`) before the login is finalized.
//! 4) Every failure path ends in `abort`, which replies `D F` and destroys
//!    the session. The reaper reclaims sessions that go quiet.
//!
//! Everything runs on one task: the daemon feeds uplink lines and reaper
//! ticks into the same `&mut SaslServ`, so no locking is needed here.

pub mod codec;
pub mod config;
pub mod login;
pub mod mechanism;
pub mod message;
pub mod registry;
pub mod service;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::directory::{
    Account, AccountDirectory, AuditLog, LoginHooks, NoopLoginHooks, PrivilegeCheck,
    TracingAuditLog,
};
use crate::uplink::Uplink;

use self::login::Authorizer;
use self::session::SessionStore;

pub use self::config::SaslConfig;
pub use self::login::{CanLoginError, LoginRejection};
pub use self::mechanism::{Mechanism, MechanismContext, Step};
pub use self::message::{Outbound, ProtocolError, SaslEvent, SaslMessage};
pub use self::registry::MechanismRegistry;
pub use self::session::{Session, SessionPhase};
pub use self::source::SourceInfo;

/// Only this mechanism may (and must) carry a certificate fingerprint.
pub const MECH_EXTERNAL: &str = "EXTERNAL";

/// Collaborators the engine talks to.
#[derive(Clone)]
pub struct Backends {
    pub(crate) uplink: Arc<dyn Uplink>,
    pub(crate) accounts: Arc<dyn AccountDirectory>,
    pub(crate) privileges: Arc<dyn PrivilegeCheck>,
    pub(crate) hooks: Arc<dyn LoginHooks>,
    pub(crate) audit: Arc<dyn AuditLog>,
}

impl Backends {
    pub fn new(
        uplink: Arc<dyn Uplink>,
        accounts: Arc<dyn AccountDirectory>,
        privileges: Arc<dyn PrivilegeCheck>,
    ) -> Self {
        Self {
            uplink,
            accounts,
            privileges,
            hooks: Arc::new(NoopLoginHooks),
            audit: Arc::new(TracingAuditLog),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn LoginHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }
}

pub struct SaslServ {
    config: SaslConfig,
    registry: MechanismRegistry,
    store: SessionStore,
    backends: Backends,
}

impl SaslServ {
    #[must_use]
    pub fn new(config: SaslConfig, backends: Backends) -> Self {
        Self {
            config,
            registry: MechanismRegistry::new(),
            store: SessionStore::new(),
            backends,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SaslConfig {
        &self.config
    }

    #[must_use]
    pub fn mechanisms(&self) -> &MechanismRegistry {
        &self.registry
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.store
    }

    /// Make `mechanism` available and re-advertise.
    pub fn register_mechanism(&mut self, mechanism: Arc<dyn Mechanism>) {
        let name = mechanism.name().to_string();
        if self.registry.find(&name).is_some() {
            warn!(mechanism = %name, "mechanism registered twice, replacing the previous one");
            self.abort_bound_to(&name);
            self.registry.unregister(&name);
        }

        self.registry.register(mechanism);
        debug!(mechanism = %name, "registered SASL mechanism");
        self.advertise();
    }

    /// Remove the mechanism called `name`, failing every session bound to it.
    pub fn unregister_mechanism(&mut self, name: &str) -> bool {
        self.abort_bound_to(name);
        if self.registry.unregister(name).is_none() {
            return false;
        }

        debug!(mechanism = %name, "unregistered SASL mechanism");
        self.advertise();
        true
    }

    fn abort_bound_to(&mut self, name: &str) {
        for session in self.store.remove_bound_to(name) {
            self.abort(session);
        }
    }

    fn advertise(&self) {
        if self.backends.uplink.is_connected() {
            self.send(Outbound::Mechlist(self.registry.advertisement()));
        }
    }

    /// A server finished bursting; bring it up to date.
    pub fn server_eob(&self, server: &str) {
        debug!(server, "sending mechanism list to new server");
        self.send(Outbound::Mechlist(self.registry.advertisement()));
    }

    /// Handle one relayed client event.
    pub fn sasl_input(&mut self, message: SaslMessage) {
        let SaslMessage { uid, server, event } = message;
        let mut session = self.store.find_or_create(&uid, &server);

        match event {
            SaslEvent::Host { host, ip, tls } => {
                session.set_host(host, ip, tls);
                self.store.restore(session);
            }
            SaslEvent::Done => self.destroy(session),
            SaslEvent::Start { .. } | SaslEvent::Data(_)
                if session.phase() == SessionPhase::AwaitingConfirmation =>
            {
                debug!(uid, "ignoring SASL data for an authorized session");
                self.store.restore(session);
            }
            SaslEvent::Start { mechanism, certfp } => {
                if mechanism == MECH_EXTERNAL {
                    let Some(certfp) = certfp else {
                        debug!(uid, "EXTERNAL requested without a certificate fingerprint");
                        self.abort(session);
                        return;
                    };
                    session.set_certfp(certfp);
                }
                self.dispatch_packet(session, mechanism.into_bytes());
            }
            SaslEvent::Data(chunk) => match session.buffer_mut().push_chunk(&chunk) {
                Ok(Some(packet)) => self.dispatch_packet(session, packet),
                Ok(None) => self.store.restore(session),
                Err(err) => {
                    debug!(uid, error = %err, "client sent too much data");
                    self.abort(session);
                }
            },
        }
    }

    /// Abort the session a malformed relay line was addressed to.
    pub fn reject_malformed(&mut self, uid: &str, err: &ProtocolError) {
        debug!(uid, error = %err, "malformed SASL message");
        if let Some(session) = self.store.remove(uid) {
            self.abort(session);
        }
    }

    fn dispatch_packet(&mut self, mut session: Session, packet: Vec<u8>) {
        let step = match session.mechanism().cloned() {
            None => {
                let name = String::from_utf8_lossy(&packet);
                let Some(mechanism) = self.registry.find(&name) else {
                    debug!(uid = session.uid(), mechanism = %name, "unknown SASL mechanism");
                    self.send(Outbound::Mechanisms {
                        target: session.uid().to_string(),
                        list: self.registry.advertisement(),
                    });
                    self.abort(session);
                    return;
                };

                session.bind(mechanism.clone());
                let authorizer = Authorizer::new(&self.backends, &self.config);
                let mut ctx = MechanismContext::new(&mut session, authorizer);
                mechanism.start(&mut ctx)
            }
            Some(mechanism) => {
                let data = match codec::decode(&packet) {
                    Ok(data) => data,
                    Err(err) => {
                        error!(uid = session.uid(), error = %err, "failed to decode client data");
                        self.bad_password(&session);
                        self.abort(session);
                        return;
                    }
                };

                let authorizer = Authorizer::new(&self.backends, &self.config);
                let mut ctx = MechanismContext::new(&mut session, authorizer);
                mechanism.step(&mut ctx, data.as_bytes())
            }
        };

        session.marked_for_deletion = false;

        match step {
            Step::Done => self.complete(session),
            Step::More(challenge) => match codec::encode(&challenge) {
                Ok(frames) => {
                    for data in frames {
                        self.send(Outbound::Continue {
                            target: session.uid().to_string(),
                            data,
                        });
                    }
                    self.store.restore(session);
                }
                Err(err) => {
                    error!(uid = session.uid(), error = %err, "mechanism output too large");
                    self.abort(session);
                }
            },
            Step::Fail => {
                self.bad_password(&session);
                self.abort(session);
            }
        }
    }

    fn complete(&mut self, mut session: Session) {
        let result = Authorizer::new(&self.backends, &self.config).login_user(&mut session);
        let account = match result {
            Ok(account) => account,
            Err(rejection) => {
                debug!(uid = session.uid(), reason = %rejection, "login rejected");
                self.abort(session);
                return;
            }
        };

        // unverified registrations are told nothing until they verify
        if !account.wait_auth {
            self.send(Outbound::SvsLogin {
                target: session.uid().to_string(),
                cloak: account.cloak.clone().unwrap_or_else(|| "*".to_string()),
                account: account.name.clone(),
            });
        }
        self.send(Outbound::Done {
            target: session.uid().to_string(),
            success: true,
        });

        session.set_phase(SessionPhase::AwaitingConfirmation);
        self.store.restore(session);
    }

    fn bad_password(&self, session: &Session) {
        let Some(account) = session
            .authceid()
            .and_then(|id| self.backends.accounts.find_by_id(id))
        else {
            return;
        };

        let source = self.source_for(session, Some(&account));
        self.backends.audit.login(
            &source,
            &format!(
                "failed LOGIN ({}) to {} (bad password)",
                session.mechanism_name().unwrap_or("?"),
                account.name
            ),
        );
        self.backends.accounts.bad_password(&source, &account);
    }

    /// The client `uid` is now live on the network.
    pub fn user_introduced(&mut self, uid: &str) {
        let Some(mut session) = self.store.remove(uid) else {
            return;
        };

        session.need_log = false;

        if session.phase() != SessionPhase::AwaitingConfirmation {
            debug!(uid, "client connected before authentication finished");
            self.destroy(session);
            return;
        }

        let Some(account) = session
            .authzeid()
            .and_then(|id| self.backends.accounts.find_by_id(id))
        else {
            self.send(Outbound::Notice {
                target: uid.to_string(),
                text: format!(
                    "Account {} dropped, login cancelled",
                    session.authzeid().unwrap_or("??")
                ),
            });
            self.destroy(session);
            return;
        };

        self.backends.accounts.login(uid, &account);
        let source = self.source_for(&session, Some(&account));
        self.backends.audit.login(
            &source,
            &format!("LOGIN ({})", session.mechanism_name().unwrap_or("?")),
        );
        self.destroy(session);
    }

    /// One reaper tick.
    pub fn reap_stale(&mut self) {
        for session in self.store.sweep() {
            debug!(uid = session.uid(), "destroying stale SASL session");
            self.destroy(session);
        }
    }

    /// Drop every remaining session. Mechanisms are expected to have been
    /// unregistered (and their sessions aborted) already.
    pub fn shutdown(&mut self) {
        if !self.store.is_empty() {
            error!(
                sessions = self.store.len(),
                "(BUG) SASL sessions still registered at shutdown"
            );
        }
        for session in self.store.drain() {
            self.destroy(session);
        }
    }

    fn abort(&self, session: Session) {
        self.send(Outbound::Done {
            target: session.uid().to_string(),
            success: false,
        });
        self.destroy(session);
    }

    fn destroy(&self, mut session: Session) {
        if session.need_log && !self.config.use_puid() {
            if let Some(account) = session
                .authceid()
                .and_then(|id| self.backends.accounts.find_by_id(id))
            {
                let source = self.source_for(&session, Some(&account));
                self.backends
                    .audit
                    .login(&source, "LOGIN (session timed out)");
            }
        }

        if let Some(mechanism) = session.mechanism().cloned() {
            mechanism.finish(&mut session);
        }
    }

    fn source_for(&self, session: &Session, account: Option<&Account>) -> SourceInfo {
        let mut source = session.source(self.config.hide_server_names());
        source.account = account.map(|account| account.name.clone());
        source
    }

    pub(crate) fn send(&self, message: Outbound) {
        self.backends.uplink.send(message);
    }
}
