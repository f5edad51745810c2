//! Per-consumer view of the transport with send cooldowns, scoped handler
//! registrations and one-shot requests.
//!
//! A [`Session`] remembers every handler it registers and removes them when
//! it is disposed or dropped, so a consumer that goes away leaves nothing
//! behind in the shared registry.

use std::{collections::HashMap, sync::Arc, time::Duration};

use kp_protocol::{Inbound, InboundKind, Outbound, OutboundKind};
use parking_lot::Mutex;
use tokio::{
    sync::{broadcast, oneshot},
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    Client, ConnectionEvent, Error, Result,
    registry::{HandlerId, Registry},
    timer::Deferred,
};

/// Cooldown bookkeeping for one outbound kind.
#[derive(Default)]
struct Cooldown {
    /// When a frame of this kind was last handed to the transport.
    last_sent: Option<Instant>,
    /// Latest debounced message waiting for the window to close.
    pending: Option<Outbound>,
}

/// Removes a registration when dropped.
struct OffGuard<'a> {
    /// Registry the handler lives in.
    registry: &'a Registry,
    /// Kind it was registered for.
    kind: InboundKind,
    /// Registration.
    id: HandlerId,
}

impl Drop for OffGuard<'_> {
    fn drop(&mut self) {
        self.registry.off(self.kind, self.id);
    }
}

/// A consumer-scoped handle on a [`Client`].
pub struct Session {
    /// Shared transport.
    client: Client,
    /// Handlers registered through this session.
    handlers: Mutex<Vec<(InboundKind, HandlerId)>>,
    /// Per-kind cooldown state.
    cooldowns: Arc<Mutex<HashMap<OutboundKind, Cooldown>>>,
    /// Trailing sends for coalesced messages.
    timers: Deferred<OutboundKind>,
    /// Minimum spacing between two sends of one kind.
    cooldown: Duration,
    /// Default timeout for [`request`](Self::request).
    request_timeout: Duration,
    /// Cancelled on dispose; wakes pending requests.
    token: CancellationToken,
}

impl Session {
    /// Open a session on `client` using its configured cooldown and timeout.
    pub fn new(client: &Client) -> Self {
        let cooldown = client.config().send_cooldown();
        let request_timeout = client.config().request_timeout();
        Self {
            client: client.clone(),
            handlers: Mutex::new(Vec::new()),
            cooldowns: Arc::new(Mutex::new(HashMap::new())),
            timers: Deferred::new(),
            cooldown,
            request_timeout,
            token: CancellationToken::new(),
        }
    }

    /// Override the send cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `msg` subject to the per-kind cooldown.
    ///
    /// With `debounce = true` the message is held for one cooldown window;
    /// later calls of the same kind inside the window replace it, and only
    /// the latest one is sent when the window closes. With `debounce = false`
    /// the message goes out at once unless the kind sent within the last
    /// window or has a held message, in which case it is dropped.
    pub fn send(&self, msg: Outbound, debounce: bool) {
        if self.token.is_cancelled() {
            debug!(action = msg.kind().as_str(), "send on disposed session ignored");
            return;
        }
        let kind = msg.kind();
        let now = Instant::now();
        let mut map = self.cooldowns.lock();
        let entry = map.entry(kind).or_default();

        if debounce {
            entry.pending = Some(msg);
            drop(map);
            if self.timers.is_pending(&kind) {
                trace!(action = kind.as_str(), "coalesced");
            } else {
                self.schedule_trailing(kind, self.cooldown);
            }
            return;
        }

        let cooling = entry
            .last_sent
            .is_some_and(|at| now < at + self.cooldown);
        if cooling || self.timers.is_pending(&kind) {
            trace!(action = kind.as_str(), "throttled");
            return;
        }
        entry.last_sent = Some(now);
        drop(map);
        self.client.send(&msg);
    }

    /// Send the held message for `kind` after `delay`.
    fn schedule_trailing(&self, kind: OutboundKind, delay: Duration) {
        let cooldowns = self.cooldowns.clone();
        let client = self.client.clone();
        self.timers.schedule(kind, delay, move || {
            let msg = {
                let mut map = cooldowns.lock();
                map.get_mut(&kind).and_then(|c| {
                    let msg = c.pending.take()?;
                    c.last_sent = Some(Instant::now());
                    Some(msg)
                })
            };
            if let Some(msg) = msg {
                client.send(&msg);
            }
        });
    }

    /// Register a handler scoped to this session.
    pub fn on<F>(&self, kind: InboundKind, handler: F) -> HandlerId
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let id = self.client.on(kind, handler);
        self.handlers.lock().push((kind, id));
        id
    }

    /// Remove a handler registered through this session.
    pub fn off(&self, kind: InboundKind, id: HandlerId) {
        self.handlers.lock().retain(|(k, h)| !(*k == kind && *h == id));
        self.client.off(kind, id);
    }

    /// Register `handler` for `reply` and send `msg` right away, bypassing
    /// the cooldown.
    ///
    /// The handler stays registered until [`off`](Self::off) or disposal and
    /// sees every later `reply` message too. Prefer
    /// [`request`](Self::request).
    pub fn once<F>(&self, msg: &Outbound, reply: InboundKind, handler: F) -> HandlerId
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let id = self.on(reply, handler);
        self.client.send(msg);
        id
    }

    /// Send `msg` and wait for the next `reply` message, using the
    /// configured request timeout.
    pub async fn request(&self, msg: &Outbound, reply: InboundKind) -> Result<Inbound> {
        self.request_once(msg, reply, self.request_timeout).await
    }

    /// Send `msg` and wait up to `timeout` for the next `reply` message.
    ///
    /// The temporary handler is removed on delivery, on timeout, on disposal
    /// and if the returned future is dropped.
    ///
    /// # Errors
    /// [`Error::Timeout`] when nothing arrives in time, [`Error::Disposed`]
    /// when the session or client goes away first.
    pub async fn request_once(
        &self,
        msg: &Outbound,
        reply: InboundKind,
        timeout: Duration,
    ) -> Result<Inbound> {
        if self.token.is_cancelled() {
            return Err(Error::Disposed);
        }
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.client.on(reply, move |m| {
            if let Some(tx) = tx.lock().take()
                && tx.send(m.clone()).is_err()
            {
                trace!("request abandoned before reply");
            }
        });
        let _guard = OffGuard {
            registry: self.client.registry(),
            kind: reply,
            id,
        };
        self.client.send(msg);

        tokio::select! {
            res = time::timeout(timeout, rx) => match res {
                Ok(Ok(m)) => Ok(m),
                Ok(Err(_)) => Err(Error::Disposed),
                Err(_) => {
                    debug!(action = reply.as_str(), "request timed out");
                    Err(Error::Timeout { action: reply.as_str() })
                }
            },
            () = self.token.cancelled() => Err(Error::Disposed),
        }
    }

    /// Subscribe to connection lifecycle events.
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.client.events()
    }

    /// Number of handlers this session currently holds.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Cancel pending sends and requests and remove every handler this
    /// session registered. Idempotent.
    pub fn dispose(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.timers.cancel_all();
        self.cooldowns.lock().clear();
        let handlers: Vec<_> = self.handlers.lock().drain(..).collect();
        for (kind, id) in handlers {
            self.client.off(kind, id);
        }
        trace!("session disposed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}
