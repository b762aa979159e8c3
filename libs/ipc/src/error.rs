//! Transport Error Types
//!
//! Every failure a session or listener can observe. Each connection-phase
//! variant carries the endpoint it pertains to plus the underlying error.

use crate::endpoint::Endpoint;
use std::io;
use thiserror::Error;

/// Boxed underlying error from the socket or protocol layer
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Name resolution failed or produced no addresses
    #[error("Resolve error: {target}: {message}")]
    Resolve {
        target: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Every candidate address refused or timed out
    #[error("Connect error: {message} (remote: {endpoint})")]
    Connect {
        endpoint: Endpoint,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// WebSocket upgrade exchange failed
    #[error("Handshake error: {message} (remote: {endpoint})")]
    Handshake {
        endpoint: Endpoint,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Inbound read failed or the peer closed the stream
    #[error("Read error: {message} (remote: {endpoint})")]
    Read {
        endpoint: Endpoint,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Outbound write failed
    #[error("Write error: {message} (remote: {endpoint})")]
    Write {
        endpoint: Endpoint,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Accepting an inbound connection failed
    #[error("Accept error on {endpoint}: {source}")]
    Accept {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors outside a session phase
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a resolve error
    pub fn resolve(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            target: target.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a resolve error with source
    pub fn resolve_with_source(
        target: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Resolve {
            target: target.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connect error
    pub fn connect(endpoint: Endpoint, message: impl Into<String>) -> Self {
        Self::Connect {
            endpoint,
            message: message.into(),
            source: None,
        }
    }

    /// Create a connect error with source
    pub fn connect_with_source(
        endpoint: Endpoint,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connect {
            endpoint,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a handshake error with source
    pub fn handshake_with_source(
        endpoint: Endpoint,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Handshake {
            endpoint,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a read error
    pub fn read(endpoint: Endpoint, message: impl Into<String>) -> Self {
        Self::Read {
            endpoint,
            message: message.into(),
            source: None,
        }
    }

    /// Create a read error with source
    pub fn read_with_source(
        endpoint: Endpoint,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Read {
            endpoint,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a write error with source
    pub fn write_with_source(
        endpoint: Endpoint,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Write {
            endpoint,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an accept error
    pub fn accept(endpoint: Endpoint, source: io::Error) -> Self {
        Self::Accept { endpoint, source }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Endpoint this error pertains to, when it belongs to a connection phase
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            TransportError::Resolve { .. } => Some(Endpoint::unspecified()),
            TransportError::Connect { endpoint, .. }
            | TransportError::Handshake { endpoint, .. }
            | TransportError::Read { endpoint, .. }
            | TransportError::Write { endpoint, .. }
            | TransportError::Accept { endpoint, .. } => Some(*endpoint),
            TransportError::Configuration { .. }
            | TransportError::Io { .. } => None,
        }
    }

    /// Check if this is a transient error.
    ///
    /// Only accept errors are ever evaluated for transience; every session
    /// error is terminal for its session regardless of this answer.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Accept { source, .. } => is_transient_accept_error(source),
            _ => false,
        }
    }

    /// Get error category for logs and stats
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Resolve { .. } => "resolve",
            TransportError::Connect { .. } => "connect",
            TransportError::Handshake { .. } => "handshake",
            TransportError::Read { .. } => "read",
            TransportError::Write { .. } => "write",
            TransportError::Accept { .. } => "accept",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Io { .. } => "io",
        }
    }
}

// Resource exhaustion and per-connection aborts leave the acceptor usable.
const EMFILE: i32 = 24;
const ENFILE: i32 = 23;
const ENOBUFS: i32 = 105;
const ENOMEM: i32 = 12;

/// Classify an accept failure: `true` means the accept loop may continue.
pub fn is_transient_accept_error(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        if matches!(code, EMFILE | ENFILE | ENOBUFS | ENOMEM) {
            return true;
        }
    }

    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    )
}

// Custom Clone implementation since Box<dyn Error> doesn't implement Clone
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Resolve {
                target, message, ..
            } => TransportError::Resolve {
                target: target.clone(),
                message: message.clone(),
                source: None, // Source errors are not cloneable, so we omit them
            },
            TransportError::Connect {
                endpoint, message, ..
            } => TransportError::Connect {
                endpoint: *endpoint,
                message: message.clone(),
                source: None,
            },
            TransportError::Handshake {
                endpoint, message, ..
            } => TransportError::Handshake {
                endpoint: *endpoint,
                message: message.clone(),
                source: None,
            },
            TransportError::Read {
                endpoint, message, ..
            } => TransportError::Read {
                endpoint: *endpoint,
                message: message.clone(),
                source: None,
            },
            TransportError::Write {
                endpoint, message, ..
            } => TransportError::Write {
                endpoint: *endpoint,
                message: message.clone(),
                source: None,
            },
            TransportError::Accept { endpoint, source } => TransportError::Accept {
                endpoint: *endpoint,
                source: clone_io_error(source),
            },
            TransportError::Configuration { message, field } => TransportError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            TransportError::Io { message, source } => TransportError::Io {
                message: message.clone(),
                source: clone_io_error(source),
            },
        }
    }
}

fn clone_io_error(err: &io::Error) -> io::Error {
    match err.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code),
        None => io::Error::new(err.kind(), err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let ep = Endpoint::from(([127, 0, 0, 1], 9000));
        assert_eq!(TransportError::connect(ep, "refused").category(), "connect");
        assert_eq!(TransportError::read(ep, "closed").category(), "read");
        assert_eq!(TransportError::resolve("nowhere:1", "no addresses").category(), "resolve");
    }

    #[test]
    fn test_endpoint_extraction() {
        let ep = Endpoint::from(([10, 0, 0, 2], 443));
        let timed_out = TransportError::handshake_with_source(
            ep,
            "handshake timed out after 30000ms",
            io::Error::from(io::ErrorKind::TimedOut),
        );
        assert_eq!(timed_out.endpoint(), Some(ep));
        assert_eq!(timed_out.category(), "handshake");
        assert_eq!(
            TransportError::resolve("example.invalid:80", "no addresses").endpoint(),
            Some(Endpoint::unspecified())
        );
        assert_eq!(TransportError::configuration("zero", None).endpoint(), None);
    }

    #[test]
    fn test_accept_error_classification() {
        let ep = Endpoint::unspecified();

        let emfile = TransportError::accept(ep, io::Error::from_raw_os_error(EMFILE));
        assert!(emfile.is_transient());

        let enfile = TransportError::accept(ep, io::Error::from_raw_os_error(ENFILE));
        assert!(enfile.is_transient());

        let aborted = TransportError::accept(ep, io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(aborted.is_transient());

        // EBADF: the acceptor itself is gone
        let bad_fd = TransportError::accept(ep, io::Error::from_raw_os_error(9));
        assert!(!bad_fd.is_transient());

        let invalid = TransportError::accept(ep, io::Error::from(io::ErrorKind::InvalidInput));
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_clone_drops_source_but_keeps_context() {
        let ep = Endpoint::from(([127, 0, 0, 1], 1));
        let err = TransportError::connect_with_source(
            ep,
            "all candidates failed",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        let cloned = err.clone();
        assert_eq!(cloned.endpoint(), Some(ep));
        assert_eq!(cloned.to_string(), err.to_string());
        assert!(std::error::Error::source(&cloned).is_none());
    }

    #[test]
    fn test_accept_clone_preserves_os_code() {
        let err = TransportError::accept(Endpoint::unspecified(), io::Error::from_raw_os_error(EMFILE));
        match err.clone() {
            TransportError::Accept { source, .. } => assert_eq!(source.raw_os_error(), Some(EMFILE)),
            other => panic!("unexpected clone: {other:?}"),
        }
    }
}
