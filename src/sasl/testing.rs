//! Recording collaborators and mechanisms for the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::mechanism::{Mechanism, MechanismContext, Step};
use super::message::Outbound;
use super::session::Session;
use super::source::SourceInfo;
use crate::directory::{Account, AuditLog};
use crate::uplink::Uplink;

pub(crate) fn account(id: &str, name: &str) -> Account {
    Account {
        id: id.to_string(),
        name: name.to_string(),
        frozen: false,
        cloak: None,
        oper_class: None,
        wait_auth: false,
        logins: 0,
    }
}

#[derive(Default)]
pub(crate) struct RecordingAudit {
    entries: Mutex<Vec<(SourceInfo, String)>>,
}

impl RecordingAudit {
    pub(crate) fn entries(&self) -> Vec<(SourceInfo, String)> {
        self.entries.lock().expect("audit lock").clone()
    }

    pub(crate) fn contains(&self, message: &str) -> bool {
        self.entries().iter().any(|(_, entry)| entry == message)
    }
}

impl AuditLog for RecordingAudit {
    fn login(&self, source: &SourceInfo, message: &str) {
        self.entries
            .lock()
            .expect("audit lock")
            .push((source.clone(), message.to_string()));
    }
}

pub(crate) struct RecordingUplink {
    sent: Mutex<Vec<Outbound>>,
    connected: AtomicBool,
}

impl Default for RecordingUplink {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }
}

impl RecordingUplink {
    /// Everything sent so far, as wire lines; clears the record.
    pub(crate) fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().expect("uplink lock"))
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Uplink for RecordingUplink {
    fn send(&self, message: Outbound) {
        self.sent.lock().expect("uplink lock").push(message);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// `PLAIN` over a fixed password table: `authzid \0 authcid \0 password`.
pub(crate) struct Plain {
    passwords: HashMap<String, String>,
}

impl Plain {
    pub(crate) fn new(passwords: &[(&str, &str)]) -> Self {
        Self {
            passwords: passwords
                .iter()
                .map(|(name, password)| (name.to_string(), password.to_string()))
                .collect(),
        }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn step(&self, ctx: &mut MechanismContext<'_>, data: &[u8]) -> Step {
        let mut fields = data.split(|byte| *byte == 0);
        let (Some(authzid), Some(authcid), Some(password), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Step::Fail;
        };
        let authzid = String::from_utf8_lossy(authzid);
        let authcid = String::from_utf8_lossy(authcid);

        let Ok(account) = ctx.authcid_can_login(&authcid) else {
            return Step::Fail;
        };
        if self.passwords.get(&account.name).map(String::as_bytes) != Some(password) {
            return Step::Fail;
        }
        if !authzid.is_empty() && ctx.authzid_can_login(&authzid).is_err() {
            return Step::Fail;
        }

        Step::Done
    }
}

/// Records every packet it is given and always asks for more.
pub(crate) struct Recorder {
    name: String,
    challenge: Vec<u8>,
    pub(crate) packets: Mutex<Vec<Vec<u8>>>,
    pub(crate) finished: AtomicUsize,
}

impl Recorder {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Self::with_challenge(name, Vec::new())
    }

    pub(crate) fn with_challenge(name: &str, challenge: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            challenge,
            packets: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        })
    }

    pub(crate) fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().expect("recorder lock").clone()
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Mechanism for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, _ctx: &mut MechanismContext<'_>) -> Step {
        Step::More(self.challenge.clone())
    }

    fn step(&self, _ctx: &mut MechanismContext<'_>, data: &[u8]) -> Step {
        self.packets.lock().expect("recorder lock").push(data.to_vec());
        Step::More(Vec::new())
    }

    fn finish(&self, _session: &mut Session) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Resolves the authcid from its first step, challenges, then rejects the
/// response.
pub(crate) struct TwoStep;

impl Mechanism for TwoStep {
    fn name(&self) -> &str {
        "TWOSTEP"
    }

    fn step(&self, ctx: &mut MechanismContext<'_>, data: &[u8]) -> Step {
        if ctx.session().authceid().is_some() {
            return Step::Fail;
        }
        match ctx.authcid_can_login(&String::from_utf8_lossy(data)) {
            Ok(_) => Step::More(b"challenge".to_vec()),
            Err(_) => Step::Fail,
        }
    }
}
