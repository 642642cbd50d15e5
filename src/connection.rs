//! Connection state machine, read loop and client handle

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    action::AmiAction,
    aggregator::{ListAggregator, Routed},
    config::{duration_ms, AmiConfig},
    constants::{
        AUTH_MESSAGE_PREFIX, BANNER_PREFIX, LIVENESS_TICK_MS, LOGOFF_TIMEOUT_MS, SOCKET_BUF_SIZE,
    },
    correlator::Correlator,
    error::{AmiError, AmiResult},
    event::AmiEvent,
    listener::{ListenerId, ListenerRegistry},
    message::AmiMessage,
    protocol::AmiParser,
    response::AmiResponse,
};

/// Lifecycle of one AMI connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConnectionState {
    Disconnected,
    /// TCP connect and banner.
    Connecting,
    /// Login sent, waiting for its response.
    Authenticating,
    /// Actions may be sent.
    Ready,
    /// Tearing down: pending actions are being failed.
    Closing,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Ready)
                | (Connecting | Authenticating | Ready, Closing)
                | (Closing, Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Client called close()
    ClientRequested,
    /// Clean EOF on the TCP connection
    ConnectionClosed,
    /// Transport I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Liveness timeout exceeded, or a keep-alive Ping went unanswered
    HeartbeatExpired,
    /// Login rejected
    AuthenticationFailed(String),
    /// Stream desync reported by the codec
    ProtocolError(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::HeartbeatExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::AuthenticationFailed(msg) => {
                write!(f, "authentication failed: {}", msg)
            }
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type EventItem = Result<AmiEvent, AmiError>;

static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Move to `next` if the transition is legal.
fn transition(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    state_tx.send_if_modified(|state| {
        if state.can_transition_to(next) {
            trace!("State {} -> {}", state, next);
            *state = next;
            true
        } else {
            debug!("Ignoring state transition {} -> {}", state, next);
            false
        }
    })
}

/// Run `fut` under `deadline`, mapping expiry to `AmiError::Timeout`.
async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = AmiResult<T>>,
) -> AmiResult<T> {
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AmiError::Timeout {
            timeout_ms: duration_ms(deadline),
        }),
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(
    host: &str,
    port: u16,
    deadline: Duration,
) -> AmiResult<TcpStream> {
    match timeout(deadline, TcpStream::connect((host, port))).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(AmiError::Io(e))
        }
        Err(_) => {
            warn!(
                "[CONNECT] TCP connect timed out after {}ms",
                deadline.as_millis()
            );
            Err(AmiError::Timeout {
                timeout_ms: duration_ms(deadline),
            })
        }
    }
}

/// Read once from the transport into the parser. EOF is a lost connection.
async fn read_more(
    reader: &mut BoxedReader,
    parser: &mut AmiParser,
    read_buffer: &mut [u8],
) -> AmiResult<()> {
    let bytes_read = reader
        .read(read_buffer)
        .await?;
    trace!("[RECV] Read {} bytes from socket", bytes_read);
    if bytes_read == 0 {
        return Err(AmiError::ConnectionLost(
            DisconnectReason::ConnectionClosed,
        ));
    }
    parser.add_data(&read_buffer[..bytes_read])
}

async fn recv_banner(
    reader: &mut BoxedReader,
    parser: &mut AmiParser,
    read_buffer: &mut [u8],
) -> AmiResult<String> {
    loop {
        if let Some(banner) = parser.parse_banner()? {
            return Ok(banner);
        }
        read_more(reader, parser, read_buffer).await?;
    }
}

/// Read a single AMI message during the handshake.
async fn recv_message(
    reader: &mut BoxedReader,
    parser: &mut AmiParser,
    read_buffer: &mut [u8],
) -> AmiResult<AmiMessage> {
    loop {
        if let Some(message) = parser.parse_message()? {
            trace!("[RECV] Parsed {} from buffer", message.kind());
            return Ok(message);
        }
        read_more(reader, parser, read_buffer).await?;
    }
}

/// Send `Login` and wait for its response, ignoring anything else.
async fn authenticate(
    reader: &mut BoxedReader,
    writer: &mut BoxedWriter,
    parser: &mut AmiParser,
    read_buffer: &mut [u8],
    config: &AmiConfig,
    action_id: String,
) -> AmiResult<AmiResponse> {
    let login = AmiAction::login(&config.username, &config.secret, config.events)?
        .with_action_id(action_id.clone())?;
    let wire = login.to_wire_format()?;
    debug!("[AUTH] Sending Login for {} [REDACTED]", config.username);
    writer
        .write_all(wire.as_bytes())
        .await?;
    writer
        .flush()
        .await?;

    loop {
        match recv_message(reader, parser, read_buffer).await? {
            AmiMessage::Response(response) if is_login_reply(&response, &action_id) => {
                if !response.is_success() {
                    return Err(AmiError::auth_failed(
                        response
                            .message()
                            .unwrap_or("Authentication failed"),
                    ));
                }
                debug!("[AUTH] Authentication successful");
                return Ok(response);
            }
            other => debug!("[AUTH] Ignoring {} before login reply", other.kind()),
        }
    }
}

/// Our Login's reply. Servers that drop the ActionID are recognised by the
/// `Authentication ...` message instead.
fn is_login_reply(response: &AmiResponse, action_id: &str) -> bool {
    match response.action_id() {
        Some(id) => id == action_id,
        None => {
            let matched = response
                .message()
                .is_some_and(|m| {
                    m.get(..AUTH_MESSAGE_PREFIX.len())
                        .is_some_and(|p| p.eq_ignore_ascii_case(AUTH_MESSAGE_PREFIX))
                });
            if matched {
                debug!("[AUTH] Login reply carries no ActionID");
            }
            matched
        }
    }
}

/// Try to send an event (or error) to one event stream via try_send.
///
/// If the channel is full, drop the item, set the stream's overflow flag,
/// and increment the dropped counter. Before each dispatch, check the
/// overflow flag and attempt to deliver a QueueFull notification first.
fn dispatch_event(
    event_tx: &mpsc::Sender<EventItem>,
    overflow: &AtomicBool,
    dropped: &AtomicU64,
    item: EventItem,
) -> bool {
    if overflow.load(Ordering::Relaxed) {
        match event_tx.try_send(Err(AmiError::QueueFull)) {
            Ok(()) => overflow.store(false, Ordering::Relaxed),
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }
    }

    match event_tx.try_send(item) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(_)) => {
            overflow.store(true, Ordering::Relaxed);
            dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Event queue full, dropping event");
            true
        }
    }
}

/// State shared by client handles, the read loop and the keep-alive task.
struct Inner {
    config: AmiConfig,
    banner: String,
    correlator: Correlator,
    listeners: Arc<ListenerRegistry>,
    writer: Mutex<Option<BoxedWriter>>,
    state_tx: watch::Sender<ConnectionState>,
    reason: OnceLock<DisconnectReason>,
    /// Set by `close()` before its Logoff so the server's EOF counts as client-requested.
    close_requested: AtomicBool,
    shutdown: Notify,
    dropped_event_count: Arc<AtomicU64>,
    /// ActionIDs whose caller gave up; the read loop drops their open lists.
    abandoned_tx: mpsc::UnboundedSender<String>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self
            .state_tx
            .borrow()
    }

    fn lost(&self) -> AmiError {
        AmiError::ConnectionLost(
            self.reason
                .get()
                .cloned()
                .unwrap_or(DisconnectReason::ConnectionClosed),
        )
    }

    /// Write one encoded block; the writer lock is held only for the write.
    async fn write_block(&self, data: &[u8], deadline: Duration) -> AmiResult<()> {
        let mut guard = self
            .writer
            .lock()
            .await;
        let Some(writer) = guard.as_mut() else {
            return Err(self.lost());
        };
        with_deadline(deadline, async {
            writer
                .write_all(data)
                .await?;
            writer
                .flush()
                .await?;
            Ok(())
        })
        .await
    }

    /// Closing procedure. Only the first caller runs it; later callers wait
    /// for it to finish. Returns whether this call ran it.
    async fn terminate(&self, reason: DisconnectReason) -> bool {
        let reason = if self
            .close_requested
            .load(Ordering::Relaxed)
        {
            DisconnectReason::ClientRequested
        } else {
            reason
        };
        if self
            .reason
            .set(reason.clone())
            .is_err()
        {
            let mut state_rx = self
                .state_tx
                .subscribe();
            let _ = state_rx
                .wait_for(|s| *s == ConnectionState::Disconnected)
                .await;
            return false;
        }

        info!("[CLOSE] Closing connection: {}", reason);
        transition(&self.state_tx, ConnectionState::Closing);

        self.correlator
            .close(reason.clone())
            .await;

        if let Some(mut writer) = self
            .writer
            .lock()
            .await
            .take()
        {
            if let Err(e) = writer
                .shutdown()
                .await
            {
                debug!("[CLOSE] Writer shutdown failed: {}", e);
            }
        }
        self.shutdown
            .notify_one();

        self.listeners
            .dispatch_disconnect(&reason);
        transition(&self.state_tx, ConnectionState::Disconnected);
        true
    }

    /// Hand one decoded message to the correlator, aggregator or listeners.
    async fn route(&self, message: AmiMessage, aggregator: &mut ListAggregator) {
        match message {
            AmiMessage::Response(response) => {
                let waited_for = match response.action_id() {
                    Some(id) => {
                        self.correlator
                            .is_pending(id)
                            .await
                    }
                    None => false,
                };
                let response = if waited_for {
                    match aggregator.open(response) {
                        Ok(()) => return,
                        Err(response) => response,
                    }
                } else {
                    response
                };
                self.correlator
                    .resolve(response)
                    .await;
            }
            AmiMessage::Event(event) => match aggregator.route(event) {
                Routed::Absorbed => {}
                Routed::Completed(response) => {
                    self.correlator
                        .resolve(response)
                        .await;
                }
                Routed::Unrelated(event) => {
                    self.listeners
                        .dispatch_event(&event);
                }
            },
            AmiMessage::Action(action) => {
                debug!("[RECV] Ignoring inbound action {}", action.name());
            }
            AmiMessage::Unknown(fields) => {
                if !fields.is_empty() {
                    debug!("[RECV] Ignoring unclassified block with {} fields", fields.len());
                }
            }
        }
    }
}

/// Background reader loop
async fn reader_loop(
    reader: BoxedReader,
    parser: AmiParser,
    abandoned_rx: mpsc::UnboundedReceiver<String>,
    inner: Arc<Inner>,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        abandoned_rx,
        inner.clone(),
    ));
    let reason = match futures_util::FutureExt::catch_unwind(result).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("[RECV] Reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };
    inner
        .terminate(reason)
        .await;
}

async fn reader_loop_inner(
    mut reader: BoxedReader,
    mut parser: AmiParser,
    mut abandoned_rx: mpsc::UnboundedReceiver<String>,
    inner: Arc<Inner>,
) -> DisconnectReason {
    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
    let mut aggregator = ListAggregator::new();
    let mut last_recv = Instant::now();
    let liveness = inner
        .config
        .liveness_timeout();
    let tick = Duration::from_millis(LIVENESS_TICK_MS);

    let reason = loop {
        while let Ok(action_id) = abandoned_rx.try_recv() {
            aggregator.abandon(&action_id);
        }

        // Drain complete blocks before reading more
        match parser.parse_message() {
            Ok(Some(message)) => {
                inner
                    .route(message, &mut aggregator)
                    .await;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[RECV] Parser error: {}", e);
                break DisconnectReason::ProtocolError(e.to_string());
            }
        }

        let read_result = tokio::select! {
            _ = inner.shutdown.notified() => {
                debug!("[RECV] Shutdown requested, reader exiting");
                break DisconnectReason::ClientRequested;
            }
            r = timeout(tick, reader.read(&mut read_buffer)) => r,
        };

        match read_result {
            Ok(Ok(0)) => {
                info!("[RECV] Connection closed (EOF)");
                break DisconnectReason::ConnectionClosed;
            }
            Ok(Ok(n)) => {
                last_recv = Instant::now();
                trace!("[RECV] Read {} bytes from socket", n);
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("[RECV] Buffer error: {}", e);
                    break DisconnectReason::ProtocolError(e.to_string());
                }
            }
            Ok(Err(e)) => {
                warn!("[RECV] Read error: {}", e);
                break DisconnectReason::IoError(e.to_string());
            }
            Err(_) => {
                if let Some(threshold) = liveness {
                    let elapsed = last_recv.elapsed();
                    if elapsed > threshold {
                        warn!(
                            "[RECV] Liveness timeout: {}ms without traffic (threshold {}ms)",
                            elapsed.as_millis(),
                            threshold.as_millis()
                        );
                        break DisconnectReason::HeartbeatExpired;
                    }
                }
            }
        }
    };

    if aggregator.open_count() > 0 {
        debug!(
            "[CLOSE] Abandoning unfinished event lists: {:?}",
            aggregator.abandon_all()
        );
    }
    reason
}

/// Periodic `Ping`. Holds only a weak reference to the connection.
fn spawn_keepalive(inner: Weak<Inner>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
            .tick()
            .await;
        loop {
            ticker
                .tick()
                .await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if inner.state() != ConnectionState::Ready {
                break;
            }
            let client = AmiClient { inner };
            match client
                .send(AmiAction::ping())
                .await
            {
                Ok(_) => trace!("[KEEPALIVE] Ping answered"),
                Err(AmiError::Timeout { timeout_ms }) => {
                    warn!("[KEEPALIVE] Ping unanswered after {}ms", timeout_ms);
                    client
                        .inner
                        .terminate(DisconnectReason::HeartbeatExpired)
                        .await;
                    break;
                }
                Err(e) => {
                    debug!("[KEEPALIVE] Stopping: {}", e);
                    break;
                }
            }
        }
    });
}

/// AMI client handle (Clone + Send)
///
/// Any number of actions may be in flight at once; replies are matched by
/// `ActionID`. A background task reads the socket, completes waiting
/// actions, assembles event lists and fans events out to listeners.
#[derive(Clone)]
pub struct AmiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiClient")
            .field("state", &self.state())
            .field("banner", &self.inner.banner)
            .finish()
    }
}

impl AmiClient {
    /// Connect over TCP to `config.host:config.port` and log in.
    pub async fn connect(config: AmiConfig) -> AmiResult<Self> {
        config.validate()?;
        info!(
            "[CONNECT] Connecting to Asterisk at {}:{}",
            config.host, config.port
        );
        let stream =
            tcp_connect_with_timeout(&config.host, config.port, config.connect_timeout()).await?;
        Self::connect_stream(stream, config).await
    }

    /// Run the AMI handshake over an already connected transport.
    ///
    /// Works with anything that reads and writes bytes (TLS streams,
    /// `tokio::io::duplex` in tests). `config.host` and `config.port` are
    /// not used.
    pub async fn connect_stream<S>(stream: S, config: AmiConfig) -> AmiResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader: BoxedReader = Box::new(read_half);
        let mut writer: BoxedWriter = Box::new(write_half);
        let mut parser = AmiParser::new();
        let mut read_buffer = [0u8; SOCKET_BUF_SIZE];

        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        transition(&state_tx, ConnectionState::Connecting);

        let seq = CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let correlator = Correlator::new(format!("{}-{}", std::process::id(), seq));

        let handshake = async {
            let banner = with_deadline(
                config.read_timeout(),
                recv_banner(&mut reader, &mut parser, &mut read_buffer),
            )
            .await?;
            if banner.starts_with(BANNER_PREFIX) {
                info!("[CONNECT] {}", banner);
            } else {
                warn!("[CONNECT] Unexpected banner: {:?}", banner);
            }

            transition(&state_tx, ConnectionState::Authenticating);
            with_deadline(
                config.read_timeout(),
                authenticate(
                    &mut reader,
                    &mut writer,
                    &mut parser,
                    &mut read_buffer,
                    &config,
                    correlator.next_action_id(),
                ),
            )
            .await?;
            Ok::<_, AmiError>(banner)
        };

        let banner = match handshake.await {
            Ok(banner) => banner,
            Err(e) => {
                let reason = match &e {
                    AmiError::AuthFailed { message } => {
                        DisconnectReason::AuthenticationFailed(message.clone())
                    }
                    AmiError::ConnectionLost(reason) => reason.clone(),
                    AmiError::ProtocolError { message } => {
                        DisconnectReason::ProtocolError(message.clone())
                    }
                    other => DisconnectReason::IoError(other.to_string()),
                };
                warn!("[CONNECT] Handshake failed: {}", reason);
                transition(&state_tx, ConnectionState::Closing);
                let _ = writer
                    .shutdown()
                    .await;
                transition(&state_tx, ConnectionState::Disconnected);
                return Err(e);
            }
        };

        transition(&state_tx, ConnectionState::Ready);
        let (abandoned_tx, abandoned_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            banner,
            correlator,
            listeners: Arc::new(ListenerRegistry::new()),
            writer: Mutex::new(Some(writer)),
            state_tx,
            reason: OnceLock::new(),
            close_requested: AtomicBool::new(false),
            shutdown: Notify::new(),
            dropped_event_count: Arc::new(AtomicU64::new(0)),
            abandoned_tx,
        });

        tokio::spawn(reader_loop(reader, parser, abandoned_rx, inner.clone()));
        if let Some(interval) = inner
            .config
            .keepalive_interval()
        {
            spawn_keepalive(Arc::downgrade(&inner), interval);
        }

        info!("[CONNECT] Logged in as {}", inner.config.username);
        Ok(Self { inner })
    }

    /// Send an action and wait up to `read_timeout` for its response.
    ///
    /// An `ActionID` is generated unless the action carries one. For actions
    /// answered with an event list, the returned response is complete and
    /// holds the collected events.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &asterisk_ami_tokio::AmiClient) -> Result<(), asterisk_ami_tokio::AmiError> {
    /// use asterisk_ami_tokio::AmiAction;
    ///
    /// let channels = client.send(AmiAction::core_show_channels()).await?.into_result()?;
    /// for event in channels.events() {
    ///     println!("{}", event.channel().unwrap_or("?"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&self, action: AmiAction) -> AmiResult<AmiResponse> {
        self.send_with_timeout(action, self.inner.config.read_timeout())
            .await
    }

    /// Like [`send`](Self::send) with an explicit deadline.
    pub async fn send_with_timeout(
        &self,
        action: AmiAction,
        deadline: Duration,
    ) -> AmiResult<AmiResponse> {
        if self
            .inner
            .reason
            .get()
            .is_some()
        {
            return Err(self.inner.lost());
        }
        let state = self.state();
        if state != ConnectionState::Ready {
            return Err(AmiError::NotReady { state });
        }

        let name = action
            .name()
            .to_string();
        let (pending, wire) = self
            .inner
            .correlator
            .submit(action)
            .await?;
        debug!("[SEND] {} (ActionID {})", name, pending.action_id);

        if let Err(e) = self
            .inner
            .write_block(wire.as_bytes(), deadline)
            .await
        {
            self.inner
                .correlator
                .cancel(&pending.action_id)
                .await;
            if let AmiError::Io(io) = &e {
                self.inner
                    .terminate(DisconnectReason::IoError(io.to_string()))
                    .await;
            }
            return Err(e);
        }

        match timeout(deadline, pending.rx).await {
            Ok(Ok(result)) => {
                if let Ok(response) = &result {
                    debug!(
                        "[RECV] {} answered: {:?}",
                        pending.action_id,
                        response.status()
                    );
                }
                result
            }
            Ok(Err(_)) => Err(self.inner.lost()),
            Err(_) => {
                self.inner
                    .correlator
                    .cancel(&pending.action_id)
                    .await;
                let _ = self
                    .inner
                    .abandoned_tx
                    .send(pending.action_id.clone());
                warn!(
                    "[SEND] {} (ActionID {}) timed out after {}ms",
                    name,
                    pending.action_id,
                    deadline.as_millis()
                );
                Err(AmiError::Timeout {
                    timeout_ms: duration_ms(deadline),
                })
            }
        }
    }

    /// Send `Ping`.
    pub async fn ping(&self) -> AmiResult<AmiResponse> {
        self.send(AmiAction::ping())
            .await?
            .into_result()
    }

    /// Run a CLI command and return its output.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &asterisk_ami_tokio::AmiClient) -> Result<(), asterisk_ami_tokio::AmiError> {
    /// let version = client.command("core show version").await?;
    /// println!("{}", version);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn command(&self, command: &str) -> AmiResult<String> {
        let response = self
            .send(AmiAction::command(command)?)
            .await?
            .into_result()?;
        Ok(response
            .output()
            .unwrap_or_default())
    }

    /// Call `handler` for every event matching `predicate`.
    ///
    /// Handlers run on the read-loop task, in registration order, and must
    /// not block. Events collected into an action's event list are not
    /// delivered here.
    pub fn add_event_listener<P, H>(&self, predicate: P, handler: H) -> ListenerId
    where
        P: Fn(&AmiEvent) -> bool + Send + Sync + 'static,
        H: Fn(&AmiEvent) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .add_event_listener(predicate, handler)
    }

    /// Remove an event listener. Returns `false` if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner
            .listeners
            .remove_event_listener(id)
    }

    /// Call `handler` once when the connection ends.
    ///
    /// If it has already ended, `handler` runs immediately.
    pub fn on_disconnect<H>(&self, handler: H) -> ListenerId
    where
        H: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let h = handler.clone();
        let id = self
            .inner
            .listeners
            .add_disconnect_listener(move |reason| h(reason));
        // Still registered after the connection ended: dispatch already ran.
        if let Some(reason) = self
            .inner
            .reason
            .get()
        {
            if self
                .inner
                .listeners
                .remove_disconnect_listener(id)
            {
                handler(reason);
            }
        }
        id
    }

    /// Remove a disconnect listener.
    pub fn remove_disconnect_listener(&self, id: ListenerId) -> bool {
        self.inner
            .listeners
            .remove_disconnect_listener(id)
    }

    /// New stream of every event not absorbed by an event list.
    ///
    /// Each stream has its own bounded queue (`event_queue_size`). The
    /// stream ends after the connection closes.
    pub fn events(&self) -> AmiEventStream {
        let queue_size = self
            .inner
            .config
            .event_queue_size
            .max(1);
        let (event_tx, event_rx) = mpsc::channel(queue_size);
        let state_rx = self
            .inner
            .state_tx
            .subscribe();

        let overflow = AtomicBool::new(false);
        let dropped = self
            .inner
            .dropped_event_count
            .clone();
        let mut id = Some(
            self.inner
                .listeners
                .add_event_listener(
                    |_| true,
                    move |event| {
                        dispatch_event(&event_tx, &overflow, &dropped, Ok(event.clone()));
                    },
                ),
        );
        // Registered after teardown cleared the registry: drop the sender so
        // the stream ends instead of waiting forever.
        if self
            .inner
            .reason
            .get()
            .is_some()
        {
            if let Some(id) = id.take() {
                self.inner
                    .listeners
                    .remove_event_listener(id);
            }
        }

        AmiEventStream {
            rx: event_rx,
            state_rx,
            listeners: self
                .inner
                .listeners
                .clone(),
            id,
        }
    }

    /// Log off (best effort, short deadline) and close the connection.
    ///
    /// Every pending action fails with `ConnectionLost(ClientRequested)`.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Ready {
            self.inner
                .close_requested
                .store(true, Ordering::Relaxed);
            info!("[CLOSE] Sending Logoff");
            if let Err(e) = self
                .send_with_timeout(
                    AmiAction::logoff(),
                    Duration::from_millis(LOGOFF_TIMEOUT_MS),
                )
                .await
            {
                debug!("[CLOSE] Logoff failed: {}", e);
            }
        }
        self.inner
            .terminate(DisconnectReason::ClientRequested)
            .await;
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.inner
            .state()
    }

    /// Whether actions can be sent.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Watch state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner
            .state_tx
            .subscribe()
    }

    /// Greeting line, e.g. `Asterisk Call Manager/7.0.3`.
    pub fn banner(&self) -> &str {
        &self.inner.banner
    }

    /// AMI protocol version from the banner (`7.0.3`).
    pub fn server_version(&self) -> Option<&str> {
        self.inner
            .banner
            .split_once('/')
            .map(|(_, version)| version.trim())
            .filter(|v| !v.is_empty())
    }

    /// Why the connection ended, once it has.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.inner
            .reason
            .get()
            .cloned()
    }

    /// Number of actions waiting for a response.
    pub async fn pending_actions(&self) -> usize {
        self.inner
            .correlator
            .pending_count()
            .await
    }

    /// Number of events dropped across all event streams because a queue was full.
    pub fn dropped_event_count(&self) -> u64 {
        self.inner
            .dropped_event_count
            .load(Ordering::Relaxed)
    }
}

/// Event stream receiver (!Clone)
///
/// Events are delivered as `Result<AmiEvent, AmiError>`. An
/// `Err(AmiError::QueueFull)` indicates that one or more events were dropped
/// because the application fell behind. Dropping the stream unregisters it.
pub struct AmiEventStream {
    rx: mpsc::Receiver<EventItem>,
    state_rx: watch::Receiver<ConnectionState>,
    listeners: Arc<ListenerRegistry>,
    id: Option<ListenerId>,
}

impl std::fmt::Debug for AmiEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiEventStream")
            .field("state", &self.state())
            .finish()
    }
}

impl AmiEventStream {
    /// Receive the next event, or None once the connection has closed and
    /// the queue is drained.
    ///
    /// Returns `Err(AmiError::QueueFull)` once per overflow episode.
    pub async fn recv(&mut self) -> Option<EventItem> {
        self.rx
            .recv()
            .await
    }

    /// Connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        *self
            .state_rx
            .borrow()
    }
}

impl futures_util::Stream for AmiEventStream {
    type Item = EventItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}

impl Drop for AmiEventStream {
    fn drop(&mut self) {
        if let Some(id) = self
            .id
            .take()
        {
            self.listeners
                .remove_event_listener(id);
        }
    }
}
