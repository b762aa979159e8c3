//! Session lifecycle state machine

use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Looking up the configured host (client only)
    Resolving,
    /// Trying candidate addresses (client only)
    Connecting,
    /// Performing the WebSocket upgrade
    Handshaking,
    /// Read loop and write queue both active
    Open,
    /// Closed at the application's request
    Closed,
    /// Failed in some phase; terminal
    Errored,
}

/// Completion events that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Resolved,
    Connected,
    HandshakeComplete,
    Failed,
    CloseRequested,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }

    /// Next state for `event`, or `None` when the event is not valid here.
    /// Terminal states absorb every event.
    pub fn transition(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Closed | Errored, _) => None,
            (_, CloseRequested) => Some(Closed),
            (_, Failed) => Some(Errored),
            (Resolving, Resolved) => Some(Connecting),
            (Connecting, Connected) => Some(Handshaking),
            (Handshaking, HandshakeComplete) => Some(Open),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}
