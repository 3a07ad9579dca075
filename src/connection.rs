use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::policy::{Attempts, ReconnectPolicy, ReconnectState, RetryDecision};
use crate::relay::{Event, RelaySet};
use crate::transport::{Connector, TransportEvent, TransportLink, WsConnector};
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

/// Broadcast channel capacity for the public event stream.
const EVENT_CAPACITY: usize = 1024;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A transport is being opened.
    Connecting,
    /// The link is established.
    Connected,
    /// The link was lost; a reconnect timer is armed.
    ReconnectScheduled {
        /// Delay the timer was armed with
        delay: Duration,
        /// Retry attempt this timer belongs to (1-based)
        attempt: u32,
    },
    /// A reconnect is being performed right now.
    Reconnecting,
    /// The retry budget is spent; automatic recovery has stopped.
    /// `close(false)` still forces a manual reconnect cycle.
    RetriesExhausted,
    /// Permanently closed. Terminal: no operation leaves this state.
    Closed,
}

/// Commands from the public handle to the connection actor.
#[derive(Debug)]
enum Command {
    Send {
        payload: String,
        ack: Option<oneshot::Sender<Result<(), Error>>>,
    },
    Close {
        permanent: bool,
    },
}

/// A single logical connection with automatic reconnection.
///
/// Owns one transport at a time and replaces it transparently after a
/// loss, following the configured retry policy. Observers subscribe once
/// and keep receiving [`Event`]s across transport replacement.
///
/// Dropping the last handle tears the connection down.
///
/// # Example
///
/// ```ignore
/// use ws_link_manager::{Connection, ConnectionConfig};
///
/// let config = ConnectionConfig::builder(
///     "wss://node.example.com:2333",
///     "123456789",
///     2,
///     "youshallnotpass",
/// )
/// .build()?;
///
/// let conn = Connection::connect(config);
/// let mut events = conn.subscribe();
/// conn.send(r#"{"op":"voiceUpdate"}"#);
/// ```
#[derive(Debug)]
pub struct Connection {
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    state_rx: watch::Receiver<ConnectionState>,
    metrics: Arc<Metrics>,
}

impl Connection {
    /// Open a connection using the production WebSocket transport.
    ///
    /// Connecting starts immediately; the first transport open happens
    /// before any command is processed.
    pub fn connect(config: ConnectionConfig) -> Self {
        Self::connect_with(config, WsConnector)
    }

    /// Open a connection through a custom [`Connector`].
    pub fn connect_with<C: Connector>(config: ConnectionConfig, connector: C) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let metrics = Arc::new(Metrics::new());

        let actor = ConnectionActor {
            policy: ReconnectPolicy::new(config.retry()),
            reconnect: ReconnectState::new(config.retry()),
            config,
            connector,
            link: None,
            relays: None,
            events: event_tx.clone(),
            state_tx,
            cmd_rx,
            timer: None,
            generation: 0,
            closed: false,
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            events: event_tx,
            state_rx,
            metrics,
        }
    }

    /// Subscribe to the event stream.
    ///
    /// The stream is stable across transport replacement: a receiver
    /// obtained before a reconnect keeps delivering events from the
    /// replacement transport under the same [`Event`] variants.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Counters for this connection.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Send a payload, fire-and-forget.
    ///
    /// Best effort by contract: when no transport is attached (for
    /// example mid-reconnect) the payload is silently dropped, neither
    /// queued nor reported as an error.
    pub fn send(&self, payload: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Send {
            payload: payload.into(),
            ack: None,
        });
    }

    /// Send a payload and wait for the transport-level write
    /// acknowledgment.
    ///
    /// Returns `None` when no transport is attached or the transport
    /// vanished before acknowledging, the same best-effort contract as
    /// [`send`](Connection::send). Do not rely on this for delivery
    /// across reconnects.
    pub async fn send_acknowledged(&self, payload: impl Into<String>) -> Option<Result<(), Error>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Send {
                payload: payload.into(),
                ack: Some(ack_tx),
            })
            .is_err()
        {
            return None;
        }
        ack_rx.await.ok()
    }

    /// Close the connection.
    ///
    /// With `permanent = true` the connection closes for good: any
    /// pending reconnect timer is cancelled, the retry state is halted,
    /// and the live transport (if any) is asked to close once. Idempotent
    /// and safe to call at any time.
    ///
    /// With `permanent = false` this forces an immediate reconnect
    /// cycle: pending timer cancelled, transport torn down and reopened
    /// with no delay. The attempt counter and the grown delay are left
    /// untouched. Ignored once the connection is permanently closed.
    pub fn close(&self, permanent: bool) {
        let _ = self.cmd_tx.send(Command::Close { permanent });
    }
}

/// Task owning the lifecycle state machine.
///
/// Single owner of the transport link, the reconnect state, and the
/// timer: commands, transport events, and timer fires are serialized
/// here, so sends never race transport replacement and at most one
/// reconnect cycle is in flight.
struct ConnectionActor<C: Connector> {
    config: ConnectionConfig,
    connector: C,
    policy: ReconnectPolicy,
    reconnect: ReconnectState,
    link: Option<TransportLink>,
    relays: Option<RelaySet>,
    events: broadcast::Sender<Event>,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Pending reconnect timer. Arming replaces any prior handle, so a
    /// stale timer can never fire.
    timer: Option<Pin<Box<Sleep>>>,
    /// Transport generation, used in log prefixes and relay origins.
    generation: u64,
    /// Set on permanent close; makes the terminal state irreversible.
    closed: bool,
    metrics: Arc<Metrics>,
}

impl<C: Connector> ConnectionActor<C> {
    async fn run(mut self) {
        self.establish(false);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Send { payload, ack }) => self.forward_send(payload, ack),
                        Some(Command::Close { permanent: true }) => self.close_permanent(),
                        Some(Command::Close { permanent: false }) => self.force_reconnect(),
                        None => {
                            // Every handle is gone; tear down and stop.
                            debug!("[LINK-{}] all handles dropped, shutting down", self.generation);
                            self.close_permanent();
                            return;
                        }
                    }
                }
                event = async {
                    match self.link.as_mut() {
                        Some(link) => link.events.recv().await,
                        None => pending().await,
                    }
                }, if self.link.is_some() => {
                    match event {
                        Some(event) => self.dispatch(event),
                        // The driver vanished without a close frame;
                        // treat it as a loss.
                        None => self.handle_close(None, "transport channel closed".to_string()),
                    }
                }
                _ = async {
                    match self.timer.as_mut() {
                        Some(timer) => timer.as_mut().await,
                        None => pending().await,
                    }
                }, if self.timer.is_some() => {
                    self.timer = None;
                    if matches!(self.reconnect.attempts, Attempts::Halted) {
                        // A permanent close raced the timer; stay down.
                        trace!("[LINK-{}] timer fired after halt, ignoring", self.generation);
                    } else {
                        self.set_state(ConnectionState::Reconnecting);
                        self.establish(true);
                    }
                }
            }
        }
    }

    /// Open a fresh transport and re-bind the event relays to it.
    fn establish(&mut self, is_reconnect: bool) {
        self.generation += 1;
        let source = format!("websocket#{}", self.generation);
        self.relays = Some(RelaySet::bind(&source, &self.events));
        self.link = Some(self.connector.open(&self.config));
        if is_reconnect {
            self.metrics.record_reconnection();
        }
        debug!(
            "[LINK-{}] connecting to {} (reconnect: {})",
            self.generation,
            self.config.address(),
            is_reconnect
        );
        self.set_state(ConnectionState::Connecting);
    }

    fn dispatch(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                info!(
                    "[LINK-{}] connected to {}",
                    self.generation,
                    self.config.address()
                );
                self.metrics.record_connection();
                self.set_state(ConnectionState::Connected);
            }
            TransportEvent::Upgrade => {
                if let Some(relays) = &self.relays {
                    relays.upgrade.forward(Event::Upgrade);
                }
            }
            TransportEvent::UnexpectedResponse { status } => {
                warn!(
                    "[LINK-{}] unexpected handshake response: {}",
                    self.generation, status
                );
                if let Some(relays) = &self.relays {
                    relays
                        .unexpected_response
                        .forward(Event::UnexpectedResponse { status });
                }
            }
            TransportEvent::Error(e) => {
                // Never fatal on its own; the transport's eventual close
                // event drives the reconnect decision.
                debug!("[LINK-{}] transport error: {}", self.generation, e);
                self.metrics.record_error();
                if let Some(relays) = &self.relays {
                    relays.error.forward(Event::Error(Arc::new(e)));
                }
            }
            TransportEvent::Message(message) => {
                self.metrics.record_message_received();
                if let Some(relays) = &self.relays {
                    relays.message.forward_tapped(
                        Event::Message(message.clone()),
                        "process_message",
                        || process_message(&message),
                    );
                }
            }
            TransportEvent::Close { code, reason } => self.handle_close(code, reason),
        }
    }

    fn handle_close(&mut self, code: Option<u16>, reason: String) {
        info!(
            "[LINK-{}] transport closed (code: {:?}, reason: {:?})",
            self.generation, code, reason
        );
        self.link = None;
        if let Some(relays) = self.relays.take() {
            relays
                .close
                .forward_tapped(Event::Closed { code, reason }, "reconnect", || {
                    self.schedule_reconnect()
                });
        } else {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.policy.decide(&mut self.reconnect) {
            RetryDecision::Halt => {
                info!(
                    "[LINK-{}] reconnection disabled, closing permanently",
                    self.generation
                );
                self.closed = true;
                self.set_state(ConnectionState::Closed);
            }
            RetryDecision::Exhausted { retries } => {
                warn!(
                    "[LINK-{}] max retries ({}) reached, giving up",
                    self.generation, retries
                );
                self.metrics.record_retries_exhausted();
                // Synthesized by the manager, not relayed from the
                // transport.
                let _ = self.events.send(Event::RetriesExhausted { retries });
                self.set_state(ConnectionState::RetriesExhausted);
            }
            RetryDecision::RetryAfter { delay, attempt } => {
                debug!(
                    "[LINK-{}] reconnecting in {:?} (attempt {})",
                    self.generation, delay, attempt
                );
                // Replaces any previously armed timer.
                self.timer = Some(Box::pin(sleep(delay)));
                self.set_state(ConnectionState::ReconnectScheduled { delay, attempt });
            }
        }
    }

    fn close_permanent(&mut self) {
        self.timer = None;
        self.reconnect.halt();
        if !self.closed {
            info!("[LINK-{}] closing permanently", self.generation);
        }
        self.closed = true;
        if let Some(link) = self.link.as_mut() {
            // Delivered at most once; the peer's close frame comes back
            // through the normal event path.
            link.request_close();
        }
        self.set_state(ConnectionState::Closed);
    }

    fn force_reconnect(&mut self) {
        if self.closed {
            debug!(
                "[LINK-{}] permanently closed, ignoring reconnect request",
                self.generation
            );
            return;
        }
        self.timer = None;
        if let Some(mut link) = self.link.take() {
            link.request_close();
        }
        self.relays = None;
        info!("[LINK-{}] immediate reconnect requested", self.generation);
        self.set_state(ConnectionState::Reconnecting);
        self.establish(true);
    }

    fn forward_send(&mut self, payload: String, ack: Option<oneshot::Sender<Result<(), Error>>>) {
        match &self.link {
            Some(link) => {
                if link.send(payload, ack) {
                    self.metrics.record_message_sent();
                } else {
                    trace!("[LINK-{}] transport gone, payload dropped", self.generation);
                }
            }
            None => {
                trace!(
                    "[LINK-{}] no transport attached, payload dropped",
                    self.generation
                );
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}

/// Hook for application-level message processing.
fn process_message(message: &Message) {
    // TODO: implement protocol-level dispatch
    trace!("processing message ({} bytes)", message.len());
}
