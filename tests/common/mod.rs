#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64ct::{Base64, Encoding};
use saslserv::directory::{Account, AuditLog, MemoryDirectory};
use saslserv::sasl::{
    Backends, Mechanism, MechanismContext, Outbound, SaslConfig, SaslMessage, SaslServ,
    SourceInfo, Step,
};
use saslserv::uplink::Uplink;

pub const SERVER: &str = "irc.example.net";

#[derive(Default)]
pub struct RecordingUplink {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingUplink {
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().expect("uplink lock"))
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl Uplink for RecordingUplink {
    fn send(&self, message: Outbound) {
        self.sent.lock().expect("uplink lock").push(message);
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("audit lock").clone()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.entries().iter().any(|entry| entry.contains(needle))
    }
}

impl AuditLog for RecordingAudit {
    fn login(&self, source: &SourceInfo, message: &str) {
        self.entries
            .lock()
            .expect("audit lock")
            .push(format!("{} {message}", source.name()));
    }
}

/// `PLAIN` test double: `authzid \0 authcid \0 password`.
pub struct Plain {
    passwords: HashMap<String, String>,
}

impl Plain {
    pub fn new(passwords: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            passwords: passwords
                .iter()
                .map(|(name, password)| ((*name).to_string(), (*password).to_string()))
                .collect(),
        })
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn step(&self, ctx: &mut MechanismContext<'_>, data: &[u8]) -> Step {
        let fields: Vec<&[u8]> = data.split(|byte| *byte == 0).collect();
        let [authzid, authcid, password] = fields.as_slice() else {
            return Step::Fail;
        };
        let authcid = String::from_utf8_lossy(authcid);
        let authzid = String::from_utf8_lossy(authzid);

        let Ok(account) = ctx.authcid_can_login(&authcid) else {
            return Step::Fail;
        };
        if self.passwords.get(&account.name).map(String::as_bytes) != Some(*password) {
            return Step::Fail;
        }
        if !authzid.is_empty() && ctx.authzid_can_login(&authzid).is_err() {
            return Step::Fail;
        }
        Step::Done
    }
}

/// `EXTERNAL` test double: the fingerprint maps to an account name.
pub struct External {
    fingerprints: HashMap<String, String>,
}

impl External {
    pub fn new(fingerprints: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            fingerprints: fingerprints
                .iter()
                .map(|(fp, name)| ((*fp).to_string(), (*name).to_string()))
                .collect(),
        })
    }
}

impl Mechanism for External {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn step(&self, ctx: &mut MechanismContext<'_>, data: &[u8]) -> Step {
        let Some(name) = ctx
            .session()
            .certfp()
            .and_then(|fp| self.fingerprints.get(fp))
            .cloned()
        else {
            return Step::Fail;
        };
        if ctx.authcid_can_login(&name).is_err() {
            return Step::Fail;
        }
        if !data.is_empty() && ctx.authzid_can_login(&String::from_utf8_lossy(data)).is_err() {
            return Step::Fail;
        }
        Step::Done
    }
}

pub fn account(id: &str, name: &str) -> Account {
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

pub struct Network {
    pub engine: SaslServ,
    pub uplink: Arc<RecordingUplink>,
    pub directory: Arc<MemoryDirectory>,
    pub audit: Arc<RecordingAudit>,
}

impl Network {
    pub fn new(config: SaslConfig) -> Self {
        let uplink = Arc::new(RecordingUplink::default());
        let directory = Arc::new(MemoryDirectory::new());
        let audit = Arc::new(RecordingAudit::default());
        let backends = Backends::new(uplink.clone(), directory.clone(), directory.clone())
            .with_audit(audit.clone());
        Self {
            engine: SaslServ::new(config, backends),
            uplink,
            directory,
            audit,
        }
    }

    /// PLAIN and EXTERNAL registered, `user`/`pass` and an oper account.
    pub fn standard() -> Self {
        let mut network = Self::new(SaslConfig::new());
        network
            .directory
            .insert(account("AAAAAAAAB", "user"), &[])
            .expect("insert user");
        network
            .directory
            .insert(account("AAAAAAAAC", "oper"), &["impersonate:class:user"])
            .expect("insert oper");
        network
            .engine
            .register_mechanism(Plain::new(&[("user", "pass"), ("oper", "operpass")]));
        network
            .engine
            .register_mechanism(External::new(&[("c0ffee", "user")]));
        network.uplink.take_lines();
        network
    }

    pub fn send(&mut self, uid: &str, mode: &str, params: &[&str]) {
        let message = SaslMessage::parse(SERVER, uid, mode, params).expect("valid message");
        self.engine.sasl_input(message);
    }

    pub fn lines(&self) -> Vec<String> {
        self.uplink.take_lines()
    }
}

pub fn b64(data: &[u8]) -> String {
    Base64::encode_string(data)
}
