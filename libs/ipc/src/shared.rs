//! Shared state between the listener and its sessions

use crate::endpoint::Endpoint;
use crate::session::{IntoFrame, Session, SessionId};
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

/// Registry collaborator handed to the listener and every inbound session.
///
/// A session joins once its handshake completes and leaves when it reaches a
/// terminal state. Implementations must tolerate calls from any thread.
pub trait SharedState: Send + Sync + 'static {
    fn join(&self, session: &Session);
    fn leave(&self, id: SessionId);
}

/// Concurrent map of open sessions with fan-out
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Open session connected to `endpoint`, if any. Lets read callbacks,
    /// which only see the peer endpoint, answer their peer.
    pub fn find(&self, endpoint: Endpoint) -> Option<Session> {
        self.sessions
            .iter()
            .find(|entry| entry.value().endpoint() == endpoint)
            .map(|entry| entry.value().clone())
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Queue one frame on every registered session. The frame is encoded once
    /// and shared; returns how many sessions accepted it.
    pub fn broadcast<T: IntoFrame>(&self, frame: T) -> usize {
        let Some(frame) = frame.into_frame() else {
            return 0;
        };

        // Snapshot first so no shard lock is held while sending
        let targets: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let delivered = targets
            .iter()
            .filter(|session| {
                let frame: Bytes = frame.clone();
                session.send_async(move || frame)
            })
            .count();

        debug!(delivered, registered = targets.len(), bytes = frame.len(), "Broadcast frame");
        delivered
    }
}

impl SharedState for SessionRegistry {
    fn join(&self, session: &Session) {
        debug!(session = %session.id(), peer = %session.endpoint(), "Session joined registry");
        self.sessions.insert(session.id(), session.clone());
    }

    fn leave(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session = %id, "Session left registry");
        }
    }
}
