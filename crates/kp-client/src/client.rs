//! The transport: one reconnecting connection, an outbound priority queue,
//! and inbound dispatch.
//!
//! [`Client`] is a cheap handle. All socket state lives in a driver task that
//! the handle talks to over a command channel, so `send` never blocks and
//! never fails from the caller's point of view.

use std::{future, sync::Arc, time::Duration};

use kp_protocol::{Envelope, Inbound, InboundKind, Outbound};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::{self, Instant},
};
use tracing::{debug, info, trace, warn};

use crate::{
    ClientConfig, Error, Result,
    connector::{Connector, Link, WsConnector},
    queue::SendQueue,
    registry::{HandlerId, Registry},
};

/// Capacity of the connection event channel.
const EVENT_CAPACITY: usize = 64;

/// Observable state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The socket is open.
    Open,
    /// Waiting for the next reconnect attempt.
    Backoff,
    /// Reconnect attempts are exhausted; only `open`/`reconnect` restart.
    GaveUp,
    /// Closed on request; only `open`/`reconnect` restart.
    Closed,
    /// The driver has stopped for good.
    Disposed,
}

/// Connection lifecycle notifications. Each close is reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket opened.
    Opened,
    /// The socket closed or a connect attempt failed.
    Closed {
        /// Reconnect attempt about to be scheduled (1-based), if any.
        attempt: Option<u32>,
        /// Delay before that attempt.
        reconnect_in: Option<Duration>,
    },
    /// The attempt ceiling was reached; no further reconnects.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// Requests from handles to the driver.
enum Command {
    /// Enqueue a frame.
    Send(Envelope),
    /// Connect if not connected; clears a previous close or give-up.
    Open,
    /// Close and stay closed.
    Close,
    /// Drop any socket and connect afresh with a reset attempt counter.
    Reconnect,
    /// Stop the driver.
    Dispose,
}

/// Shared handle state.
struct Inner {
    /// Command channel into the driver.
    commands: mpsc::UnboundedSender<Command>,
    /// Inbound handlers.
    registry: Registry,
    /// Lifecycle notifications.
    events: broadcast::Sender<ConnectionEvent>,
    /// Current connection state.
    state: watch::Receiver<ConnectionState>,
    /// Configuration the client was built with.
    config: ClientConfig,
    /// Resolved endpoint.
    url: String,
}

/// Handle to the transport. Clones share one connection.
#[derive(Clone)]
pub struct Client {
    /// Shared state.
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client and start its driver task. No connection is made until
    /// [`open`](Self::open) or the first [`send`](Self::send).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let url = config.endpoint()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let registry = Registry::new();

        let driver = Driver {
            url: url.clone(),
            config: config.clone(),
            connector,
            commands: cmd_rx,
            connect_tx: conn_tx,
            connect_rx: conn_rx,
            registry: registry.clone(),
            events: events.clone(),
            state: state_tx,
            queue: SendQueue::new(),
            link: None,
            connecting: None,
            generation: 0,
            attempts: 0,
            retry_at: None,
            drain_at: None,
            last_write: None,
            halted: false,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            inner: Arc::new(Inner {
                commands: cmd_tx,
                registry,
                events,
                state: state_rx,
                config,
                url,
            }),
        })
    }

    /// Build a client that talks WebSocket via `tokio-tungstenite`.
    pub fn with_websocket(config: ClientConfig) -> Result<Self> {
        Self::new(config, Arc::new(WsConnector))
    }

    /// Resolved endpoint URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Post a command; a stopped driver is logged once per call.
    fn command(&self, cmd: Command) {
        if self.inner.commands.send(cmd).is_err() {
            debug!("client driver stopped; command dropped");
        }
    }

    /// Connect now. Clears an earlier `close()` or give-up.
    pub fn open(&self) {
        self.command(Command::Open);
    }

    /// Close the socket and stop reconnecting. Queued frames are kept.
    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// Drop any socket and connect again with a fresh attempt budget.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Stop the driver. Queued frames are discarded and handlers cleared.
    pub fn dispose(&self) {
        self.command(Command::Dispose);
    }

    /// Queue `msg` for delivery. Never fails; encoding problems are logged.
    pub fn send(&self, msg: &Outbound) {
        match msg.to_envelope() {
            Ok(env) => self.send_envelope(env),
            Err(e) => warn!(action = msg.kind().as_str(), error = %e, "dropping unencodable message"),
        }
    }

    /// Queue a raw envelope for delivery.
    pub fn send_envelope(&self, env: Envelope) {
        trace!(action = %env.action, "enqueue");
        self.command(Command::Send(env));
    }

    /// Register a handler for an inbound kind.
    pub fn on<F>(&self, kind: InboundKind, handler: F) -> HandlerId
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.inner.registry.on(kind, handler)
    }

    /// Remove a handler.
    pub fn off(&self, kind: InboundKind, id: HandlerId) {
        self.inner.registry.off(kind, id);
    }

    /// The dispatch registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Subscribe to connection lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Wait until the connection is open.
    ///
    /// # Errors
    /// [`Error::Timeout`] if it does not open in time, [`Error::Disposed`] if
    /// the driver stops first.
    pub async fn wait_open(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state.clone();
        let wait = rx.wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Disposed));
        match time::timeout(timeout, wait).await {
            Ok(Ok(s)) if *s == ConnectionState::Open => Ok(()),
            Ok(_) => Err(Error::Disposed),
            Err(_) => Err(Error::Timeout { action: "open" }),
        }
    }
}

/// Result of a connect attempt, tagged with its generation.
type ConnectOutcome = (u64, Result<Box<dyn Link>>);

/// Something that happened on the live link.
enum LinkEvent {
    /// A text frame arrived.
    Frame(String),
    /// The link failed or the peer closed it.
    Lost(Option<Error>),
}

/// Owns the socket, the queue and the reconnect schedule.
struct Driver {
    /// Endpoint.
    url: String,
    /// Timing knobs.
    config: ClientConfig,
    /// Opens links.
    connector: Arc<dyn Connector>,
    /// Commands from handles.
    commands: mpsc::UnboundedReceiver<Command>,
    /// Handed to connect tasks.
    connect_tx: mpsc::UnboundedSender<ConnectOutcome>,
    /// Connect results.
    connect_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
    /// Inbound handlers.
    registry: Registry,
    /// Lifecycle notifications.
    events: broadcast::Sender<ConnectionEvent>,
    /// Published state.
    state: watch::Sender<ConnectionState>,
    /// Outbound frames awaiting an open socket.
    queue: SendQueue,
    /// Live link, if open.
    link: Option<Box<dyn Link>>,
    /// Generation of the connect attempt in flight.
    connecting: Option<u64>,
    /// Last issued attempt generation.
    generation: u64,
    /// Consecutive failed attempts since the last open.
    attempts: u32,
    /// When the next reconnect attempt fires.
    retry_at: Option<Instant>,
    /// When the next queued frame is written. At most one drain step is
    /// ever scheduled.
    drain_at: Option<Instant>,
    /// When the live link last accepted a frame.
    last_write: Option<Instant>,
    /// Closed on request or gave up; sends queue without dialing.
    halted: bool,
}

/// Sleep until `at`, or forever when unset.
async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(t) => time::sleep_until(t).await,
        None => future::pending().await,
    }
}

/// Next event from the link, or pend forever when there is none.
async fn next_event(link: &mut Option<Box<dyn Link>>) -> LinkEvent {
    match link {
        Some(l) => match l.recv().await {
            Some(Ok(text)) => LinkEvent::Frame(text),
            Some(Err(e)) => LinkEvent::Lost(Some(e)),
            None => LinkEvent::Lost(None),
        },
        None => future::pending().await,
    }
}

impl Driver {
    /// Event loop.
    async fn run(mut self) {
        loop {
            let drain_at = self.drain_at;
            let retry_at = self.retry_at;
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Dispose) | None => break,
                    Some(cmd) => self.on_command(cmd).await,
                },
                Some((generation, res)) = self.connect_rx.recv() => {
                    self.on_connected(generation, res).await;
                }
                ev = next_event(&mut self.link) => match ev {
                    LinkEvent::Frame(text) => self.on_frame(&text),
                    LinkEvent::Lost(err) => self.on_lost(err),
                },
                () = sleep_until(drain_at) => {
                    self.drain_at = None;
                    self.drain_step().await;
                }
                () = sleep_until(retry_at) => {
                    self.retry_at = None;
                    self.start_connect();
                }
            }
        }
        self.shutdown().await;
    }

    /// Handle one command.
    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send(env) => {
                self.queue.push(env);
                if self.link.is_some() {
                    self.schedule_drain();
                } else if !self.halted && self.connecting.is_none() {
                    // Sending while offline dials immediately, even mid-backoff.
                    self.start_connect();
                }
            }
            Command::Open => {
                self.halted = false;
                if self.link.is_none() && self.connecting.is_none() {
                    self.attempts = 0;
                    self.start_connect();
                }
            }
            Command::Close => {
                self.halted = true;
                self.retry_at = None;
                self.connecting = None;
                self.drop_link().await;
                self.publish(ConnectionState::Closed);
                info!("connection closed on request");
            }
            Command::Reconnect => {
                self.halted = false;
                self.attempts = 0;
                self.retry_at = None;
                self.connecting = None;
                self.drop_link().await;
                self.start_connect();
            }
            Command::Dispose => {}
        }
    }

    /// Publish a new connection state.
    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Notify lifecycle subscribers. Having none is fine.
    fn emit(&self, ev: ConnectionEvent) {
        if self.events.send(ev).is_err() {
            trace!("no connection event subscribers");
        }
    }

    /// Begin a connect attempt unless one is in flight or a link is open.
    fn start_connect(&mut self) {
        if self.link.is_some() || self.connecting.is_some() {
            return;
        }
        self.retry_at = None;
        self.generation += 1;
        let generation = self.generation;
        self.connecting = Some(generation);
        self.publish(ConnectionState::Connecting);
        info!(url = %self.url, attempt = self.attempts + 1, "connecting");

        let connector = self.connector.clone();
        let url = self.url.clone();
        let tx = self.connect_tx.clone();
        let timeout = self.config.connect_timeout();
        tokio::spawn(async move {
            let res = match time::timeout(timeout, connector.connect(&url)).await {
                Ok(res) => res,
                Err(_) => Err(Error::Connect("connect timed out".to_string())),
            };
            if tx.send((generation, res)).is_err() {
                trace!("driver gone before connect finished");
            }
        });
    }

    /// Handle the outcome of a connect attempt.
    async fn on_connected(&mut self, generation: u64, res: Result<Box<dyn Link>>) {
        if self.connecting != Some(generation) {
            if let Ok(mut stale) = res {
                trace!(generation, "closing stale link");
                stale.close().await;
            }
            return;
        }
        self.connecting = None;
        match res {
            Ok(link) => {
                self.link = Some(link);
                self.attempts = 0;
                self.retry_at = None;
                self.publish(ConnectionState::Open);
                info!(url = %self.url, queued = self.queue.len(), "connection open");
                self.emit(ConnectionEvent::Opened);
                self.schedule_drain();
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.schedule_reconnect();
            }
        }
    }

    /// The link errored or closed. Both take the reconnect path.
    fn on_lost(&mut self, err: Option<Error>) {
        match err {
            Some(e) => warn!(error = %e, "connection error"),
            None => info!("connection closed by peer"),
        }
        self.link = None;
        self.drain_at = None;
        self.last_write = None;
        self.schedule_reconnect();
    }

    /// Arrange the next attempt with capped exponential backoff, or give up.
    fn schedule_reconnect(&mut self) {
        if self.halted {
            self.publish(ConnectionState::Closed);
            return;
        }
        if self.attempts >= self.config.max_reconnect_attempts {
            self.halted = true;
            self.publish(ConnectionState::GaveUp);
            warn!(attempts = self.attempts, "giving up on reconnect");
            self.emit(ConnectionEvent::GaveUp {
                attempts: self.attempts,
            });
            return;
        }
        let delay = self.config.backoff(self.attempts);
        self.attempts += 1;
        self.retry_at = Some(Instant::now() + delay);
        self.publish(ConnectionState::Backoff);
        debug!(attempt = self.attempts, delay_ms = delay.as_millis(), "reconnect scheduled");
        self.emit(ConnectionEvent::Closed {
            attempt: Some(self.attempts),
            reconnect_in: Some(delay),
        });
    }

    /// Schedule a drain step unless one is already pending. Steps are kept
    /// at least one drain interval after the previous write.
    fn schedule_drain(&mut self) {
        if self.drain_at.is_some() {
            return;
        }
        let now = Instant::now();
        let at = self
            .last_write
            .map_or(now, |t| t + self.config.drain_interval());
        self.drain_at = Some(at.max(now));
    }

    /// Write one queued frame, then schedule the next step.
    async fn drain_step(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let Some(env) = self.queue.pop() else {
            return;
        };
        let text = match env.to_text() {
            Ok(t) => t,
            Err(e) => {
                warn!(action = %env.action, error = %e, "dropping unencodable frame");
                self.schedule_drain();
                return;
            }
        };
        match link.send(text).await {
            Ok(()) => {
                trace!(action = %env.action, remaining = self.queue.len(), "sent");
                self.last_write = Some(Instant::now());
                if !self.queue.is_empty() {
                    self.schedule_drain();
                }
            }
            Err(e) => {
                self.queue.requeue(env);
                self.on_lost(Some(e));
            }
        }
    }

    /// Decode and dispatch one inbound frame. Bad frames are dropped.
    fn on_frame(&self, text: &str) {
        let msg = match Envelope::from_text(text).and_then(Inbound::from_envelope) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping inbound frame");
                return;
            }
        };
        self.registry.dispatch(&msg);
    }

    /// Close any live link.
    async fn drop_link(&mut self) {
        self.drain_at = None;
        self.last_write = None;
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    /// Final teardown.
    async fn shutdown(&mut self) {
        self.drop_link().await;
        let dropped = self.queue.len();
        self.queue.clear();
        self.registry.clear();
        self.publish(ConnectionState::Disposed);
        info!(dropped, "client disposed");
    }
}
