//! WebSocket Session Core
//!
//! Connection lifecycle and message delivery for bidirectional WebSocket
//! links:
//! - [`Listener`] accepts inbound connections and spawns one [`Session`] each
//! - [`Session`] drives resolve/connect/handshake, a continuous read loop and
//!   a serialized, single-write-in-flight outbound queue
//! - [`SharedState`] is the registry collaborator inbound sessions join
//!
//! Framing and the upgrade exchange come from `tokio-tungstenite`. Payload
//! encoding is the caller's: messages are submitted as serializers that
//! produce an owned frame.

pub mod callbacks;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod session;
pub mod shared;

// Re-export commonly used types
pub use callbacks::Callbacks;
pub use config::{ListenerConfig, SessionConfig};
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{Acceptor, FailureHook, Listener, ListenerHandle};
pub use session::{
    IntoFrame, OutboundMessage, Role, Session, SessionId, SessionState, SessionStatsSnapshot,
    WeakSession,
};
pub use shared::{SessionRegistry, SharedState};
