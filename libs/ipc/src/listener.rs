//! Connection Listener
//!
//! Owns one acceptor bound to a local endpoint. Every accepted connection
//! becomes an inbound [`Session`] that is started immediately and then left to
//! manage its own lifetime; the listener keeps no reference to it.

use crate::callbacks::Callbacks;
use crate::config::ListenerConfig;
use crate::endpoint::Endpoint;
use crate::session::Session;
use crate::shared::SharedState;
use crate::{Result, TransportError};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const LISTEN_BACKLOG: u32 = 1024;

/// Source of inbound connections
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    /// Wait for the next inbound connection
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    /// Address the acceptor is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Receives a human-readable operation name and the error
pub type FailureHook = Arc<dyn Fn(&str, &TransportError) + Send + Sync>;

/// Accepts inbound connections and launches sessions
pub struct Listener {
    runtime: Handle,
    acceptor: Box<dyn Acceptor>,
    local_endpoint: Endpoint,
    shared_state: Arc<dyn SharedState>,
    callbacks: Callbacks,
    config: ListenerConfig,
    failure_hook: FailureHook,
}

impl Listener {
    /// Bind to `local_endpoint` with default settings
    pub fn new(
        runtime: &Handle,
        local_endpoint: impl Into<Endpoint>,
        shared_state: Arc<dyn SharedState>,
        callbacks: Callbacks,
    ) -> Result<Self> {
        let config = ListenerConfig {
            bind_address: local_endpoint.into().socket_addr(),
            ..Default::default()
        };
        Self::from_config(runtime, config, shared_state, callbacks)
    }

    /// Bind to `config.bind_address`
    pub fn from_config(
        runtime: &Handle,
        config: ListenerConfig,
        shared_state: Arc<dyn SharedState>,
        callbacks: Callbacks,
    ) -> Result<Self> {
        config.validate()?;
        let listener = bind(runtime, config.bind_address)?;
        Self::with_acceptor(runtime, listener, config, shared_state, callbacks)
    }

    /// Use an already-bound acceptor
    pub fn with_acceptor(
        runtime: &Handle,
        acceptor: impl Acceptor,
        config: ListenerConfig,
        shared_state: Arc<dyn SharedState>,
        callbacks: Callbacks,
    ) -> Result<Self> {
        let local_endpoint = acceptor
            .local_addr()
            .map(Endpoint::from)
            .map_err(|e| TransportError::io("Failed to get listener address", e))?;

        Ok(Self {
            runtime: runtime.clone(),
            acceptor: Box::new(acceptor),
            local_endpoint,
            shared_state,
            callbacks,
            config,
            failure_hook: Arc::new(log_failure),
        })
    }

    /// Replace the default failure hook, which logs at error level
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &TransportError) + Send + Sync + 'static,
    {
        self.failure_hook = Arc::new(hook);
        self
    }

    /// Bound address; reports the real port when bound to port 0
    pub fn local_endpoint(&self) -> Endpoint {
        self.local_endpoint
    }

    /// Start the accept loop on the runtime
    pub fn run(self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let local_endpoint = self.local_endpoint;
        let runtime = self.runtime.clone();
        let task = runtime.spawn(self.accept_loop(shutdown_rx));

        ListenerHandle {
            local_endpoint,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn accept_loop(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Listening for WebSocket connections on {}", self.local_endpoint);

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.acceptor.accept() => result,
            };

            match accepted {
                Ok((stream, peer)) => self.on_accept(stream, peer),
                Err(e) => {
                    let err = TransportError::accept(self.local_endpoint, e);
                    (self.failure_hook)("accept", &err);

                    if !err.is_transient() {
                        error!(
                            local = %self.local_endpoint,
                            error = %err,
                            "Acceptor failed, stopping listener"
                        );
                        return Err(err);
                    }

                    warn!(
                        local = %self.local_endpoint,
                        error = %err,
                        backoff_ms = self.config.accept_error_backoff.as_millis() as u64,
                        "Transient accept failure"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.config.accept_error_backoff) => {}
                    }
                }
            }
        }

        info!("Listener on {} shut down", self.local_endpoint);
        Ok(())
    }

    fn on_accept(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(peer = %peer, local = %self.local_endpoint, "Accepted TCP connection");

        let session = Session::server(
            &self.runtime,
            stream,
            peer,
            self.shared_state.clone(),
            self.callbacks.clone(),
            self.config.session.clone(),
        );
        session.run();
    }
}

/// Control handle for a running listener. Dropping it also stops the
/// accept loop.
pub struct ListenerHandle {
    local_endpoint: Endpoint,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    pub fn local_endpoint(&self) -> Endpoint {
        self.local_endpoint
    }

    /// Stop accepting. Does not fire the failure hook and does not touch
    /// sessions that are already running.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the accept loop to exit. `Ok` after a shutdown, the fatal
    /// accept error otherwise.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::io(
                "Listener task aborted",
                io::Error::new(io::ErrorKind::Other, e.to_string()),
            )),
        }
    }
}

fn bind(runtime: &Handle, addr: SocketAddr) -> Result<TcpListener> {
    // Registering with the reactor needs the runtime context
    let _guard = runtime.enter();

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| TransportError::io("Failed to create TCP socket", e))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| TransportError::io("Failed to set SO_REUSEADDR", e))?;
    socket
        .bind(addr)
        .map_err(|e| TransportError::io(format!("Failed to bind TCP listener to {}", addr), e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| TransportError::io("Failed to listen", e))
}

fn log_failure(what: &str, err: &TransportError) {
    error!(operation = what, category = err.category(), "{}: {}", what, err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::SessionRegistry;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::new(
            &Handle::current(),
            SocketAddr::from(([127, 0, 0, 1], 0)),
            Arc::new(SessionRegistry::new()),
            Callbacks::new(),
        )
        .unwrap();

        let local = listener.local_endpoint();
        assert_ne!(local.port(), 0);
        assert!(local.address().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_io_error() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap();

        let err = Listener::new(
            &Handle::current(),
            taken,
            Arc::new(SessionRegistry::new()),
            Callbacks::new(),
        )
        .err()
        .expect("second bind should fail");
        assert_eq!(err.category(), "io");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = ListenerConfig::default();
        config.session.connect_timeout = std::time::Duration::ZERO;

        let result = Listener::from_config(
            &Handle::current(),
            config,
            Arc::new(SessionRegistry::new()),
            Callbacks::new(),
        );
        assert!(matches!(result, Err(TransportError::Configuration { .. })));
    }
}
