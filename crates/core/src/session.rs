use crate::error::GatewayError;
use crate::types::{Session, SessionId};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Synchronized registry of live MCP sessions.
///
/// The store is the only shared mutable state in the gateway core. All access
/// goes through `create`/`lookup`/`touch`/`destroy`; each operation takes the
/// map lock once, so per-session mutations are atomic. Expiry is checked
/// lazily on lookup; `sweep` exists so a periodic task can bound growth.
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new session and return its identifier.
    pub fn create(
        &self,
        protocol_version: String,
        client_name: Option<String>,
        client_version: Option<String>,
    ) -> SessionId {
        let id = SessionId::generate();
        let session = Session::new(id.clone(), protocol_version, client_name, client_version);
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), session);
        tracing::info!("created session {}", id);
        id
    }

    /// Look up a live session, removing it if its idle TTL has elapsed.
    ///
    /// A successful lookup refreshes the last-activity timestamp under the
    /// same lock acquisition, so check-and-touch is atomic: a concurrent
    /// `destroy` cannot slip between validation and refresh.
    pub fn lookup(&self, id: &SessionId) -> Result<Session, GatewayError> {
        let mut sessions = self.sessions.lock().unwrap();
        let now = Utc::now();
        match sessions.get_mut(id) {
            Some(session) => {
                if now - session.last_activity <= self.ttl {
                    session.last_activity = now;
                    return Ok(session.clone());
                }
            }
            None => return Err(GatewayError::SessionNotFound(id.clone())),
        }
        sessions.remove(id);
        tracing::info!("session {} expired", id);
        Err(GatewayError::SessionNotFound(id.clone()))
    }

    /// Refresh a session's last-activity timestamp.
    pub fn touch(&self, id: &SessionId) -> Result<(), GatewayError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(id) {
            Some(session) => {
                session.last_activity = Utc::now();
                Ok(())
            }
            None => Err(GatewayError::SessionNotFound(id.clone())),
        }
    }

    /// Remove a session. Idempotent: destroying an absent id is not an error.
    pub fn destroy(&self, id: &SessionId) {
        if self.sessions.lock().unwrap().remove(id).is_some() {
            tracing::info!("destroyed session {}", id);
        }
    }

    /// Drop every session idle longer than the TTL; returns how many.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity >= cutoff);
        before - sessions.len()
    }

    /// Number of sessions currently held (expired-but-unswept included).
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }
}
