//! Callback table handed to every session
//!
//! Each handler is optional; an unset handler is simply skipped. The table is
//! cheap to clone so a listener can hand the same set to every session it
//! spawns.

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use std::fmt;
use std::sync::Arc;

type ReadFn = dyn Fn(&Endpoint, &[u8]) + Send + Sync;
type ResultFn = dyn Fn(&Endpoint, Option<&TransportError>) + Send + Sync;
type ErrorFn = dyn Fn(&Endpoint, &TransportError) + Send + Sync;

/// Optional per-event handlers for a session
#[derive(Clone, Default)]
pub struct Callbacks {
    read: Option<Arc<ReadFn>>,
    accept: Option<Arc<ResultFn>>,
    close: Option<Arc<ResultFn>>,
    error: Option<Arc<ErrorFn>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every inbound message. The slice is only valid for the
    /// duration of the call.
    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint, &[u8]) + Send + Sync + 'static,
    {
        self.read = Some(Arc::new(f));
        self
    }

    /// Called once per inbound session with the handshake result
    pub fn on_accept<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint, Option<&TransportError>) + Send + Sync + 'static,
    {
        self.accept = Some(Arc::new(f));
        self
    }

    /// Called exactly once when the session terminates. `None` means the
    /// application asked for the close.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint, Option<&TransportError>) + Send + Sync + 'static,
    {
        self.close = Some(Arc::new(f));
        self
    }

    /// Called at most once, right before `on_close`, when the session fails
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Endpoint, &TransportError) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_read(&self, endpoint: &Endpoint, payload: &[u8]) {
        if let Some(f) = &self.read {
            f(endpoint, payload);
        }
    }

    pub(crate) fn fire_accept(&self, endpoint: &Endpoint, result: Option<&TransportError>) {
        if let Some(f) = &self.accept {
            f(endpoint, result);
        }
    }

    pub(crate) fn fire_close(&self, endpoint: &Endpoint, reason: Option<&TransportError>) {
        if let Some(f) = &self.close {
            f(endpoint, reason);
        }
    }

    pub(crate) fn fire_error(&self, endpoint: &Endpoint, error: &TransportError) {
        if let Some(f) = &self.error {
            f(endpoint, error);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("read", &self.read.is_some())
            .field("accept", &self.accept.is_some())
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}
