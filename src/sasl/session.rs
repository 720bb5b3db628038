//! SASL sessions and the store that owns them.
//!
//! A session is keyed by the connection id (`uid`) the relaying server gave
//! the client. The store hands sessions out by value while an event is being
//! processed and takes them back only if they survive it, so a terminated
//! session can be destroyed exactly once: whoever holds it owns it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::codec::{EMPTY_FRAME, SASL_C2S_MAXLEN, SASL_S2S_MAXLEN};
use super::mechanism::Mechanism;
use super::source::SourceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client packet would exceed {SASL_C2S_MAXLEN} bytes")]
pub struct BufferOverflow;

/// Accumulates client data chunks until a packet is complete.
///
/// Holds strictly less than [`SASL_C2S_MAXLEN`] bytes; a chunk that would
/// reach the limit is refused rather than truncated.
#[derive(Debug, Default, Clone)]
pub struct ClientBuffer {
    data: Vec<u8>,
}

impl ClientBuffer {
    /// Append one relayed chunk, returning the packet once it is complete.
    ///
    /// A chunk shorter than a full frame ends the packet. A lone `+` after
    /// full-length chunks only marks the end and is not part of the data.
    ///
    /// # Errors
    /// Returns `BufferOverflow` if the chunk does not fit.
    pub fn push_chunk(&mut self, chunk: &str) -> Result<Option<Vec<u8>>, BufferOverflow> {
        if chunk == EMPTY_FRAME && !self.data.is_empty() {
            return Ok(Some(self.take()));
        }

        if self.data.len() + chunk.len() >= SASL_C2S_MAXLEN {
            return Err(BufferOverflow);
        }
        self.data.extend_from_slice(chunk.as_bytes());

        if chunk.len() < SASL_S2S_MAXLEN {
            Ok(Some(self.take()))
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

/// Where a live session is in its lifecycle. Destroyed sessions no longer
/// exist, so there is no variant for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Exchanging data with a mechanism (or not started yet).
    Authenticating,
    /// Login authorized; waiting for the client to show up on the network.
    AwaitingConfirmation,
}

pub struct Session {
    uid: String,
    server: String,
    host: Option<String>,
    ip: Option<String>,
    tls: bool,
    certfp: Option<String>,
    buffer: ClientBuffer,
    mechanism: Option<Arc<dyn Mechanism>>,
    mechanism_state: Option<Box<dyn Any + Send>>,
    authceid: Option<String>,
    authzeid: Option<String>,
    pub(crate) need_log: bool,
    pub(crate) marked_for_deletion: bool,
    phase: SessionPhase,
}

impl Session {
    #[must_use]
    pub fn new(uid: &str, server: &str) -> Self {
        Self {
            uid: uid.to_string(),
            server: server.to_string(),
            host: None,
            ip: None,
            tls: false,
            certfp: None,
            buffer: ClientBuffer::default(),
            mechanism: None,
            mechanism_state: None,
            authceid: None,
            authzeid: None,
            need_log: false,
            marked_for_deletion: false,
            phase: SessionPhase::Authenticating,
        }
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    #[must_use]
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Client certificate fingerprint, only set for `EXTERNAL`.
    #[must_use]
    pub fn certfp(&self) -> Option<&str> {
        self.certfp.as_deref()
    }

    #[must_use]
    pub fn mechanism(&self) -> Option<&Arc<dyn Mechanism>> {
        self.mechanism.as_ref()
    }

    #[must_use]
    pub fn mechanism_name(&self) -> Option<&str> {
        self.mechanism.as_ref().map(|mechanism| mechanism.name())
    }

    /// Entity id of the account whose credentials were verified.
    #[must_use]
    pub fn authceid(&self) -> Option<&str> {
        self.authceid.as_deref()
    }

    /// Entity id of the account that will be logged in.
    #[must_use]
    pub fn authzeid(&self) -> Option<&str> {
        self.authzeid.as_deref()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    /// Current display identity.
    #[must_use]
    pub fn source(&self, hide_server_names: bool) -> SourceInfo {
        SourceInfo {
            uid: Some(self.uid.clone()),
            host: self.host.clone(),
            ip: self.ip.clone(),
            server: Some(self.server.clone()),
            account: None,
            hide_server_names,
        }
    }

    /// Mechanism-private state, if it is of type `T`.
    #[must_use]
    pub fn state<T: Any + Send>(&self) -> Option<&T> {
        self.mechanism_state.as_ref()?.downcast_ref::<T>()
    }

    pub fn state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.mechanism_state.as_mut()?.downcast_mut::<T>()
    }

    pub fn set_state<T: Any + Send>(&mut self, state: T) {
        self.mechanism_state = Some(Box::new(state));
    }

    /// Remove and return the mechanism-private state if it is of type `T`.
    pub fn take_state<T: Any + Send>(&mut self) -> Option<T> {
        if !self.mechanism_state.as_ref()?.is::<T>() {
            return None;
        }
        self.mechanism_state
            .take()?
            .downcast::<T>()
            .ok()
            .map(|state| *state)
    }

    pub(crate) fn set_host(&mut self, host: String, ip: String, tls: bool) {
        self.host = Some(host);
        self.ip = Some(ip);
        self.tls = tls;
    }

    pub(crate) fn set_certfp(&mut self, certfp: String) {
        self.certfp = Some(certfp);
        self.tls = true;
    }

    pub(crate) fn bind(&mut self, mechanism: Arc<dyn Mechanism>) {
        debug_assert!(self.mechanism.is_none(), "mechanism binding never changes");
        if self.mechanism.is_none() {
            self.mechanism = Some(mechanism);
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut ClientBuffer {
        &mut self.buffer
    }

    pub(crate) fn set_authceid(&mut self, id: String) {
        self.authceid = Some(id);
    }

    pub(crate) fn set_authzeid(&mut self, id: String) {
        self.authzeid = Some(id);
    }

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("server", &self.server)
            .field("host", &self.host)
            .field("ip", &self.ip)
            .field("tls", &self.tls)
            .field("certfp", &self.certfp)
            .field("buffered", &self.buffer.len())
            .field("mechanism", &self.mechanism_name())
            .field("authceid", &self.authceid)
            .field("authzeid", &self.authzeid)
            .field("need_log", &self.need_log)
            .field("marked_for_deletion", &self.marked_for_deletion)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Live sessions keyed by connection id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the session for `uid`, creating it if needed.
    ///
    /// The session leaves the store; give it back with [`Self::restore`] if
    /// it survives, otherwise destroy it.
    pub fn find_or_create(&mut self, uid: &str, server: &str) -> Session {
        self.sessions
            .remove(uid)
            .unwrap_or_else(|| Session::new(uid, server))
    }

    #[must_use]
    pub fn find(&self, uid: &str) -> Option<&Session> {
        self.sessions.get(uid)
    }

    /// Take the session for `uid` out of the store.
    pub fn remove(&mut self, uid: &str) -> Option<Session> {
        self.sessions.remove(uid)
    }

    /// Put a surviving session back under its key.
    pub fn restore(&mut self, session: Session) {
        let previous = self.sessions.insert(session.uid.clone(), session);
        debug_assert!(previous.is_none(), "session keys are unique");
    }

    pub fn all(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session bound to the mechanism called `name`.
    pub fn remove_bound_to(&mut self, name: &str) -> Vec<Session> {
        let uids: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.mechanism_name() == Some(name))
            .map(|session| session.uid.clone())
            .collect();
        uids.iter().filter_map(|uid| self.sessions.remove(uid)).collect()
    }

    /// One reaper tick: remove sessions already marked, mark the rest.
    pub fn sweep(&mut self) -> Vec<Session> {
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.marked_for_deletion)
            .map(|session| session.uid.clone())
            .collect();

        let removed = stale
            .iter()
            .filter_map(|uid| self.sessions.remove(uid))
            .collect();

        for session in self.sessions.values_mut() {
            session.marked_for_deletion = true;
        }

        removed
    }

    /// Remove every session.
    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_chunk_completes_packet() {
        let mut buffer = ClientBuffer::default();
        assert_eq!(buffer.push_chunk("QUJD"), Ok(Some(b"QUJD".to_vec())));
        assert!(buffer.is_empty());
    }

    #[test]
    fn full_chunks_accumulate_until_short_one() {
        let full = "A".repeat(SASL_S2S_MAXLEN);
        let mut buffer = ClientBuffer::default();
        assert_eq!(buffer.push_chunk(&full), Ok(None));
        assert_eq!(buffer.push_chunk(&full), Ok(None));
        assert_eq!(buffer.len(), 800);

        let tail = "B".repeat(50);
        let packet = buffer.push_chunk(&tail).expect("fits").expect("complete");
        assert_eq!(packet, format!("{full}{full}{tail}").into_bytes());
        assert!(buffer.is_empty());
    }

    #[test]
    fn plus_after_full_chunks_terminates_without_data() {
        let full = "A".repeat(SASL_S2S_MAXLEN);
        let mut buffer = ClientBuffer::default();
        assert_eq!(buffer.push_chunk(&full), Ok(None));
        assert_eq!(buffer.push_chunk("+"), Ok(Some(full.into_bytes())));
        // on its own, + is the packet
        assert_eq!(buffer.push_chunk("+"), Ok(Some(b"+".to_vec())));
    }

    #[test]
    fn overflow_is_refused() {
        let full = "A".repeat(SASL_S2S_MAXLEN);
        let mut buffer = ClientBuffer::default();
        let mut result = Ok(None);
        for _ in 0..(SASL_C2S_MAXLEN / SASL_S2S_MAXLEN + 1) {
            result = buffer.push_chunk(&full);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(BufferOverflow));
        assert!(buffer.len() < SASL_C2S_MAXLEN);
    }

    #[test]
    fn find_or_create_never_duplicates() {
        let mut store = SessionStore::new();
        let session = store.find_or_create("001AAAAAB", "irc.example.net");
        store.restore(session);
        let session = store.find_or_create("001AAAAAB", "other.example.net");
        // the existing session keeps its original server
        assert_eq!(session.server(), "irc.example.net");
        store.restore(session);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_marks_then_removes() {
        let mut store = SessionStore::new();
        let session = store.find_or_create("a", "s");
        store.restore(session);

        assert!(store.sweep().is_empty());
        assert!(store.find("a").is_some_and(Session::is_marked_for_deletion));

        let session = store.find_or_create("b", "s");
        store.restore(session);

        let removed = store.sweep();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].uid(), "a");
        assert!(store.find("b").is_some_and(Session::is_marked_for_deletion));
    }

    #[test]
    fn mechanism_state_is_typed() {
        let mut session = Session::new("a", "s");
        session.set_state(41u32);
        assert_eq!(session.state::<String>(), None);
        if let Some(counter) = session.state_mut::<u32>() {
            *counter += 1;
        }
        assert_eq!(session.take_state::<String>(), None);
        assert_eq!(session.take_state::<u32>(), Some(42));
        assert_eq!(session.state::<u32>(), None);
    }
}
