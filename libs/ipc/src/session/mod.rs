//! WebSocket Session Actor
//!
//! A session drives one connection from resolve/connect (client role) or from
//! the accepted stream (server role) through the WebSocket handshake, then
//! runs an inbound read loop and a serialized outbound write queue until an
//! error or an explicit close.
//!
//! Every session is one spawned task. All callbacks, queue mutation and state
//! changes happen on that task, so no two callbacks of a session ever run
//! concurrently. Producers on other threads reach the task through an
//! unbounded command channel.
//!
//! The task owns a clone of its own [`Session`] handle, so a session stays
//! reachable for as long as it has work pending even when every external
//! handle has been dropped. The task returns, and releases that clone, once
//! the session reaches a terminal state.

mod outbound;
mod state;
mod stats;

pub use outbound::{IntoFrame, OutboundMessage, OutboundQueue};
pub use state::{SessionEvent, SessionState};
pub use stats::{SessionStats, SessionStatsSnapshot};

use crate::callbacks::Callbacks;
use crate::config::SessionConfig;
use crate::endpoint::Endpoint;
use crate::shared::SharedState;
use crate::{Result, TransportError};
use futures_util::future::OptionFuture;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::{FutureExt, SinkExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsResult = std::result::Result<(), tokio_tungstenite::tungstenite::Error>;
type WriteFuture = Pin<Box<dyn Future<Output = (WsSink, WsResult)> + Send>>;

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_BURST: usize = 64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Which side initiated the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

enum Command {
    Send(OutboundMessage),
    Close,
}

/// How the actor begins
enum Start {
    Client { host: String, port: u16 },
    Server { stream: TcpStream },
}

/// Everything the actor needs, parked until `run()`
struct Seed {
    start: Start,
    commands: mpsc::UnboundedReceiver<Command>,
    callbacks: Callbacks,
    config: SessionConfig,
    shared_state: Option<Arc<dyn SharedState>>,
}

struct SessionShared {
    id: SessionId,
    role: Role,
    runtime: Handle,
    endpoint: RwLock<Endpoint>,
    state: watch::Sender<SessionState>,
    stats: SessionStats,
    seed: Mutex<Option<Seed>>,
}

/// Cloneable handle to a session actor
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Non-owning handle; does not keep the session alive
#[derive(Clone)]
pub struct WeakSession {
    shared: Weak<SessionShared>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Session {
    /// Create an outbound session for `host:port`. Nothing happens until
    /// [`Session::run`].
    pub fn client(
        runtime: &Handle,
        host: impl Into<String>,
        port: u16,
        callbacks: Callbacks,
        config: SessionConfig,
    ) -> Self {
        let start = Start::Client {
            host: host.into(),
            port,
        };
        Self::build(
            runtime,
            Role::Client,
            Endpoint::unspecified(),
            SessionState::Resolving,
            start,
            callbacks,
            config,
            None,
        )
    }

    /// Create an inbound session over an accepted stream. It starts at the
    /// handshake and joins `shared_state` once open.
    pub fn server(
        runtime: &Handle,
        stream: TcpStream,
        peer: SocketAddr,
        shared_state: Arc<dyn SharedState>,
        callbacks: Callbacks,
        config: SessionConfig,
    ) -> Self {
        Self::build(
            runtime,
            Role::Server,
            Endpoint::from(peer),
            SessionState::Handshaking,
            Start::Server { stream },
            callbacks,
            config,
            Some(shared_state),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        runtime: &Handle,
        role: Role,
        endpoint: Endpoint,
        initial: SessionState,
        start: Start,
        callbacks: Callbacks,
        config: SessionConfig,
        shared_state: Option<Arc<dyn SharedState>>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(initial);

        let seed = Seed {
            start,
            commands: commands_rx,
            callbacks,
            config,
            shared_state,
        };

        Self {
            shared: Arc::new(SessionShared {
                id: SessionId::next(),
                role,
                runtime: runtime.clone(),
                endpoint: RwLock::new(endpoint),
                state: state_tx,
                stats: SessionStats::new(),
                seed: Mutex::new(Some(seed)),
            }),
            commands: commands_tx,
        }
    }

    /// Spawn the actor. Returns `false` if the session was already started.
    pub fn run(&self) -> bool {
        let Some(seed) = self.shared.seed.lock().take() else {
            warn!(session = %self.id(), "Session already running");
            return false;
        };

        let actor = SessionActor {
            this: self.clone(),
            commands: seed.commands,
            commands_closed: false,
            callbacks: seed.callbacks,
            config: seed.config,
            shared_state: seed.shared_state,
            joined: false,
            queue: OutboundQueue::new(),
            state: *self.shared.state.borrow(),
            endpoint: self.endpoint(),
        };

        let start = seed.start;
        self.shared.runtime.spawn(actor.run(start));
        true
    }

    /// Serialize a message now and queue it for writing.
    ///
    /// The serializer runs synchronously on the caller's thread. An empty or
    /// absent frame is dropped without touching the queue. Returns `true` if
    /// the frame was handed to the session.
    pub fn send_async<F, T>(&self, serializer: F) -> bool
    where
        F: FnOnce() -> T,
        T: IntoFrame,
    {
        let Some(message) = OutboundMessage::from_serializer(serializer) else {
            self.shared.stats.record_empty_dropped();
            trace!(session = %self.id(), "Dropping empty outbound message");
            return false;
        };

        if self.commands.send(Command::Send(message)).is_err() {
            debug!(session = %self.id(), "Send on finished session ignored");
            return false;
        }
        true
    }

    /// Request an orderly close. `on_close` fires with no error.
    pub fn close(&self) {
        if self.commands.send(Command::Close).is_err() {
            debug!(session = %self.id(), "Close on finished session ignored");
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Remote peer; unspecified until the client role has connected
    pub fn endpoint(&self) -> Endpoint {
        *self.shared.endpoint.read()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Resolves once the session has terminated and its final callbacks
    /// (`on_error`, `on_close`) have returned
    pub async fn closed(&self) -> SessionState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // Sender lives in `shared`, which `self` keeps alive
            Err(_) => self.state(),
        };
        state
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            shared: Arc::downgrade(&self.shared),
            commands: self.commands.downgrade(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

impl WeakSession {
    pub fn upgrade(&self) -> Option<Session> {
        Some(Session {
            shared: self.shared.upgrade()?,
            commands: self.commands.upgrade()?,
        })
    }

    /// `true` once no handle (external or the actor's own) remains
    pub fn is_released(&self) -> bool {
        self.shared.strong_count() == 0
    }
}

/// The task-side half of a session
struct SessionActor {
    this: Session,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_closed: bool,
    callbacks: Callbacks,
    config: SessionConfig,
    shared_state: Option<Arc<dyn SharedState>>,
    joined: bool,
    queue: OutboundQueue,
    state: SessionState,
    endpoint: Endpoint,
}

impl SessionActor {
    async fn run(mut self, start: Start) {
        let ws = match start {
            Start::Client { host, port } => self.establish_client(host, port).await,
            Start::Server { stream } => self.establish_server(stream).await,
        };

        if let Some(ws) = ws {
            self.run_open(ws).await;
        }

        self.finish();
    }

    async fn establish_client(&mut self, host: String, port: u16) -> Option<WsStream> {
        let target = format!("{}:{}", host, port);
        debug!(session = %self.id(), target = %target, "Resolving");

        let resolve_timeout = self.config.resolve_timeout;
        let addrs = self
            .drive(resolve(host.clone(), port, resolve_timeout))
            .await?;
        self.advance(SessionEvent::Resolved);

        let connect_timeout = self.config.connect_timeout;
        let (stream, peer) = self.drive(connect_any(addrs, connect_timeout)).await?;
        self.set_endpoint(peer.into());
        self.configure_stream(&stream);
        self.advance(SessionEvent::Connected);
        debug!(session = %self.id(), peer = %self.endpoint, "Connected, starting handshake");

        let handshake = handshake_client(stream, self.endpoint, host, port, self.config.clone());
        let ws = self.drive(handshake).await?;
        self.enter_open();
        Some(ws)
    }

    async fn establish_server(&mut self, stream: TcpStream) -> Option<WsStream> {
        self.configure_stream(&stream);
        debug!(session = %self.id(), peer = %self.endpoint, "Accepting WebSocket handshake");

        let handshake = handshake_server(stream, self.endpoint, self.config.clone());
        let result = self.drive_raw(handshake).await?;

        match result {
            Ok(ws) => {
                self.callbacks.fire_accept(&self.endpoint, None);
                self.enter_open();
                Some(ws)
            }
            Err(err) => {
                self.callbacks.fire_accept(&self.endpoint, Some(&err));
                self.fail(err);
                None
            }
        }
    }

    /// Await a connection-phase future, reporting its error as terminal
    async fn drive<T, F>(&mut self, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.drive_raw(fut).await? {
            Ok(value) => Some(value),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Await a connection-phase future while still serving commands. Sends
    /// are queued for when the session opens; a close request abandons the
    /// phase and yields `None`. Pending commands are served first, but the
    /// phase is polled at least once every `COMMAND_BURST` commands.
    async fn drive_raw<T, F>(&mut self, fut: F) -> Option<Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::pin!(fut);
        let mut burst = 0;
        loop {
            if burst >= COMMAND_BURST {
                burst = 0;
                if let Some(result) = fut.as_mut().now_or_never() {
                    return Some(result);
                }
            }

            tokio::select! {
                biased;
                cmd = self.commands.recv(), if !self.commands_closed => {
                    burst += 1;
                    match cmd {
                        Some(Command::Send(message)) => self.on_send(message),
                        Some(Command::Close) => {
                            self.close();
                            return None;
                        }
                        None => self.commands_closed = true,
                    }
                },
                result = fut.as_mut() => return Some(result),
            }
        }
    }

    async fn run_open(&mut self, ws: WsStream) {
        let (sink, mut stream) = ws.split();
        let mut sink = Some(sink);
        let mut write: Option<WriteFuture> = None;

        // Anything queued while connecting goes out first
        self.start_write(&mut sink, &mut write);

        loop {
            tokio::select! {
                cmd = self.commands.recv(), if !self.commands_closed => match cmd {
                    Some(Command::Send(message)) => {
                        self.on_send(message);
                        self.start_write(&mut sink, &mut write);
                    }
                    Some(Command::Close) => {
                        let sink = self.reclaim_sink(sink.take(), write.take()).await;
                        self.close_open(sink).await;
                        return;
                    }
                    None => self.commands_closed = true,
                },
                frame = stream.next() => {
                    let result = match frame {
                        Some(Ok(message)) => self.on_read(message),
                        Some(Err(e)) => Err(TransportError::read_with_source(self.endpoint, "read failed", e)),
                        None => Err(TransportError::read(self.endpoint, "stream ended")),
                    };
                    if let Err(err) = result {
                        self.abandon_write(write.take());
                        self.fail(err);
                        return;
                    }
                },
                Some((returned, result)) = OptionFuture::from(write.as_mut()), if write.is_some() => {
                    write = None;
                    sink = Some(returned);
                    if let Err(err) = self.on_write(result) {
                        self.fail(err);
                        return;
                    }
                    self.start_write(&mut sink, &mut write);
                },
            }
        }
    }

    fn on_send(&mut self, message: OutboundMessage) {
        let bytes = message.len();
        self.queue.push(message);
        self.this.shared.stats.record_queue_depth(self.queue.len());
        trace!(session = %self.id(), bytes, depth = self.queue.len(), "Queued outbound message");
    }

    /// Begin writing the queue head unless a write is already in flight
    fn start_write(&mut self, sink: &mut Option<WsSink>, write: &mut Option<WriteFuture>) {
        if write.is_some() {
            return;
        }
        let Some(mut half) = sink.take() else {
            return;
        };
        let Some(payload) = self.queue.begin_write() else {
            *sink = Some(half);
            return;
        };

        trace!(session = %self.id(), bytes = payload.len(), "Writing outbound message");
        // Reuses the allocation unless the frame is shared, e.g. a broadcast
        let frame = Message::Binary(Vec::from(payload));
        self.this.shared.stats.record_write_started();

        *write = Some(Box::pin(async move {
            let result = half.send(frame).await;
            (half, result)
        }));
    }

    /// Let an in-flight write finish so the close frame can follow it.
    /// Returns the write half, or `None` if it is lost.
    async fn reclaim_sink(
        &mut self,
        sink: Option<WsSink>,
        write: Option<WriteFuture>,
    ) -> Option<WsSink> {
        let Some(write) = write else {
            return sink;
        };

        match timeout(CLOSE_FRAME_TIMEOUT, write).await {
            Ok((half, result)) => match self.on_write(result) {
                Ok(()) => Some(half),
                Err(err) => {
                    debug!(session = %self.id(), error = %err, "In-flight write failed while closing");
                    None
                }
            },
            Err(_) => {
                self.this.shared.stats.record_write_finished(0, false);
                debug!(session = %self.id(), "Timed out finishing in-flight write while closing");
                None
            }
        }
    }

    /// Drop an in-flight write, keeping the stats balanced
    fn abandon_write(&self, write: Option<WriteFuture>) {
        if write.is_some() {
            self.this.shared.stats.record_write_finished(0, false);
            trace!(session = %self.id(), "Abandoned in-flight write");
        }
    }

    fn on_write(&mut self, result: WsResult) -> Result<()> {
        if let Err(e) = result {
            self.this.shared.stats.record_write_finished(0, false);
            return Err(TransportError::write_with_source(self.endpoint, "write failed", e));
        }

        let bytes = self.queue.complete_write().map(|m| m.len()).unwrap_or(0);
        self.this.shared.stats.record_write_finished(bytes, true);
        self.this.shared.stats.record_queue_depth(self.queue.len());
        debug!(
            session = %self.id(),
            peer = %self.endpoint,
            bytes,
            remaining = self.queue.len(),
            "Sent WebSocket message"
        );
        Ok(())
    }

    fn on_read(&mut self, message: Message) -> Result<()> {
        let payload: &[u8] = match &message {
            Message::Binary(data) => data.as_slice(),
            Message::Text(text) => text.as_bytes(),
            Message::Close(frame) => {
                let reason = match frame {
                    Some(frame) => format!("closed by peer: {} {}", u16::from(frame.code), frame.reason),
                    None => "closed by peer".to_string(),
                };
                return Err(TransportError::read(self.endpoint, reason));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                trace!(session = %self.id(), "Control frame");
                return Ok(());
            }
        };

        self.this.shared.stats.record_receive(payload.len());
        debug!(
            session = %self.id(),
            peer = %self.endpoint,
            bytes = payload.len(),
            "Received WebSocket message"
        );
        self.callbacks.fire_read(&self.endpoint, payload);
        Ok(())
    }

    fn enter_open(&mut self) {
        self.advance(SessionEvent::HandshakeComplete);
        info!(session = %self.id(), peer = %self.endpoint, role = ?self.this.role(), "Session open");

        if let Some(shared_state) = &self.shared_state {
            shared_state.join(&self.this);
            self.joined = true;
        }
    }

    /// Close requested while open: best-effort close frame, then report
    async fn close_open(&mut self, sink: Option<WsSink>) {
        self.advance(SessionEvent::CloseRequested);
        if let Some(mut sink) = sink {
            match timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(None))).await {
                Ok(Ok(())) => trace!(session = %self.id(), "Close frame sent"),
                Ok(Err(e)) => debug!(session = %self.id(), error = %e, "Failed to send close frame"),
                Err(_) => debug!(session = %self.id(), "Timed out sending close frame"),
            }
        }
        self.report_close();
    }

    /// Close requested before the session opened
    fn close(&mut self) {
        self.advance(SessionEvent::CloseRequested);
        self.report_close();
    }

    fn report_close(&mut self) {
        let dropped = self.queue.abandon();
        info!(session = %self.id(), peer = %self.endpoint, dropped, "Session closed");
        self.callbacks.fire_close(&self.endpoint, None);
    }

    /// Terminal failure: on_error then on_close, exactly once
    fn fail(&mut self, err: TransportError) {
        if self.state.is_terminal() {
            return;
        }
        if self.endpoint.is_unspecified() {
            if let Some(endpoint) = err.endpoint() {
                self.set_endpoint(endpoint);
            }
        }

        self.advance(SessionEvent::Failed);
        let dropped = self.queue.abandon();
        warn!(
            session = %self.id(),
            peer = %self.endpoint,
            category = err.category(),
            dropped,
            error = %err,
            "Session failed"
        );

        self.callbacks.fire_error(&self.endpoint, &err);
        self.callbacks.fire_close(&self.endpoint, Some(&err));
    }

    fn finish(&mut self) {
        if self.joined {
            if let Some(shared_state) = &self.shared_state {
                shared_state.leave(self.id());
            }
            self.joined = false;
        }
        self.this.shared.stats.record_queue_depth(0);

        // Published last so `closed()` observers see every callback done
        self.this.shared.state.send_replace(self.state);
        trace!(session = %self.id(), state = %self.state, "Session actor finished");
    }

    fn advance(&mut self, event: SessionEvent) {
        match self.state.transition(event) {
            Some(next) => {
                trace!(session = %self.id(), from = %self.state, to = %next, "Session transition");
                self.state = next;
                if !next.is_terminal() {
                    self.this.shared.state.send_replace(next);
                }
            }
            None => warn!(
                session = %self.id(),
                state = %self.state,
                ?event,
                "Ignoring invalid session transition"
            ),
        }
    }

    fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = endpoint;
        *self.this.shared.endpoint.write() = endpoint;
    }

    fn configure_stream(&self, stream: &TcpStream) {
        if self.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }
    }

    fn id(&self) -> SessionId {
        self.this.id()
    }
}

async fn resolve(host: String, port: u16, limit: Duration) -> Result<Vec<SocketAddr>> {
    let target = format!("{}:{}", host, port);
    let addrs = match timeout(limit, tokio::net::lookup_host((host.as_str(), port))).await {
        Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
        Ok(Err(e)) => {
            return Err(TransportError::resolve_with_source(target, "lookup failed", e));
        }
        Err(_) => {
            return Err(TransportError::resolve_with_source(
                target,
                format!("lookup timed out after {}ms", limit.as_millis()),
                io::Error::from(io::ErrorKind::TimedOut),
            ));
        }
    };

    if addrs.is_empty() {
        return Err(TransportError::resolve(target, "no addresses"));
    }
    Ok(addrs)
}

/// Try each candidate in order under one shared deadline
async fn connect_any(addrs: Vec<SocketAddr>, limit: Duration) -> Result<(TcpStream, SocketAddr)> {
    let deadline = Instant::now() + limit;
    let mut last_failure: Option<(SocketAddr, io::Error)> = None;

    for addr in addrs {
        match timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok((stream, addr)),
            Ok(Err(e)) => {
                debug!(peer = %addr, error = %e, "Connect attempt failed");
                last_failure = Some((addr, e));
            }
            Err(_) => {
                return Err(TransportError::connect_with_source(
                    addr.into(),
                    format!("connect timed out after {}ms", limit.as_millis()),
                    io::Error::from(io::ErrorKind::TimedOut),
                ));
            }
        }
    }

    Err(match last_failure {
        Some((addr, e)) => {
            TransportError::connect_with_source(addr.into(), "all candidate addresses failed", e)
        }
        None => TransportError::connect(Endpoint::unspecified(), "no candidate addresses"),
    })
}

async fn handshake_client(
    stream: TcpStream,
    endpoint: Endpoint,
    host: String,
    port: u16,
    config: SessionConfig,
) -> Result<WsStream> {
    // IPv6 literals need brackets in the request authority
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    let url = format!("ws://{}{}", authority, config.path);

    let mut request = url.as_str().into_client_request().map_err(|e| {
        TransportError::handshake_with_source(endpoint, format!("invalid request {}", url), e)
    })?;
    let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
        TransportError::handshake_with_source(endpoint, "invalid user agent", e)
    })?;
    request.headers_mut().insert(USER_AGENT, user_agent);

    let handshake = tokio_tungstenite::client_async_with_config(
        request,
        stream,
        Some(config.websocket_config()),
    );

    match timeout(config.handshake_timeout, handshake).await {
        Ok(Ok((ws, response))) => {
            trace!(peer = %endpoint, status = %response.status(), "Handshake response");
            Ok(ws)
        }
        Ok(Err(e)) => Err(TransportError::handshake_with_source(endpoint, "handshake failed", e)),
        Err(_) => Err(TransportError::handshake_with_source(
            endpoint,
            format!("handshake timed out after {}ms", config.handshake_timeout.as_millis()),
            io::Error::from(io::ErrorKind::TimedOut),
        )),
    }
}

async fn handshake_server(
    stream: TcpStream,
    endpoint: Endpoint,
    config: SessionConfig,
) -> Result<WsStream> {
    let handshake =
        tokio_tungstenite::accept_async_with_config(stream, Some(config.websocket_config()));

    match timeout(config.handshake_timeout, handshake).await {
        Ok(Ok(ws)) => Ok(ws),
        Ok(Err(e)) => Err(TransportError::handshake_with_source(endpoint, "handshake failed", e)),
        Err(_) => Err(TransportError::handshake_with_source(
            endpoint,
            format!("handshake timed out after {}ms", config.handshake_timeout.as_millis()),
            io::Error::from(io::ErrorKind::TimedOut),
        )),
    }
}
