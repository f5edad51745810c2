//! Test support utilities for kp-client and its dependents.
//! These helpers are public so downstream crates can drive a client against an
//! in-memory backend. They are intended for use by test suites only.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use kp_protocol::Envelope;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};

use crate::{
    ClientConfig, Error, Result,
    connector::{Connector, Link},
};

/// Client configuration pointing at a placeholder endpoint.
pub fn fake_config() -> ClientConfig {
    ClientConfig {
        url: Some("ws://backend.test/ws".to_string()),
        ..ClientConfig::default()
    }
}

/// Something the backend does to the live link.
enum PeerEvent {
    /// Deliver a text frame.
    Frame(String),
    /// Close cleanly.
    Close,
    /// Report a socket error.
    Fail,
}

/// Mutable backend state.
struct State {
    /// Whether connect attempts succeed.
    accept: bool,
    /// Frames the client has written, in order.
    sent: Vec<Envelope>,
    /// Connect attempts seen.
    connects: usize,
    /// Id of the live link.
    current: Option<u64>,
    /// Channel into the live link.
    peer: Option<mpsc::UnboundedSender<PeerEvent>>,
}

/// An in-memory backend that doubles as a [`Connector`].
#[derive(Clone)]
pub struct FakeBackend {
    /// Shared state.
    state: Arc<Mutex<State>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// A backend that accepts connections.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                accept: true,
                sent: Vec::new(),
                connects: 0,
                current: None,
                peer: None,
            })),
        }
    }

    /// A backend that refuses connections until [`set_accept`](Self::set_accept).
    pub fn refusing() -> Self {
        let b = Self::new();
        b.set_accept(false);
        b
    }

    /// This backend as a connector for [`crate::Client::new`].
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Accept or refuse future connect attempts.
    pub fn set_accept(&self, accept: bool) {
        self.state.lock().accept = accept;
    }

    /// Whether a link is currently open.
    pub fn is_connected(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Number of connect attempts seen.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Every frame written by the client so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.state.lock().sent.clone()
    }

    /// Action names of every frame written so far.
    pub fn sent_actions(&self) -> Vec<String> {
        self.state.lock().sent.iter().map(|e| e.action.clone()).collect()
    }

    /// Forget recorded frames.
    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// Deliver an envelope to the client. Returns false if no link is open.
    pub fn push(&self, action: &str, data: impl Serialize) -> bool {
        match serde_json::to_value(data) {
            Ok(data) => match Envelope::new(action, data).to_text() {
                Ok(text) => self.push_raw(&text),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Deliver raw text to the client. Returns false if no link is open.
    pub fn push_raw(&self, text: &str) -> bool {
        self.peer_event(PeerEvent::Frame(text.to_string()))
    }

    /// Close the live link from the backend side.
    pub fn drop_connection(&self) -> bool {
        let ok = self.peer_event(PeerEvent::Close);
        self.detach();
        ok
    }

    /// Fail the live link with a socket error.
    pub fn fail_connection(&self) -> bool {
        let ok = self.peer_event(PeerEvent::Fail);
        self.detach();
        ok
    }

    /// Forget the live link.
    fn detach(&self) {
        let mut s = self.state.lock();
        s.current = None;
        s.peer = None;
    }

    /// Send an event to the live link.
    fn peer_event(&self, ev: PeerEvent) -> bool {
        self.state
            .lock()
            .peer
            .as_ref()
            .is_some_and(|p| p.send(ev).is_ok())
    }

    /// Wait until at least `n` frames were written, up to `timeout_ms`.
    pub async fn wait_sent(&self, n: usize, timeout_ms: u64) -> bool {
        self.wait_until(timeout_ms, |b| b.sent.len() >= n).await
    }

    /// Wait until a link is open, up to `timeout_ms`.
    pub async fn wait_connected(&self, timeout_ms: u64) -> bool {
        self.wait_until(timeout_ms, |b| b.current.is_some()).await
    }

    /// Poll `pred` against the backend state until it holds or time runs out.
    async fn wait_until<F>(&self, timeout_ms: u64, pred: F) -> bool
    where
        F: Fn(&State) -> bool,
    {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let done = pred(&self.state.lock());
            if done {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl Connector for FakeBackend {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Link>> {
        let mut s = self.state.lock();
        s.connects += 1;
        if !s.accept {
            return Err(Error::Connect("connection refused".to_string()));
        }
        let id = s.connects as u64;
        let (tx, rx) = mpsc::unbounded_channel();
        s.current = Some(id);
        s.peer = Some(tx);
        Ok(Box::new(FakeLink {
            id,
            rx,
            state: self.state.clone(),
        }))
    }
}

/// Client side of a [`FakeBackend`] connection.
struct FakeLink {
    /// Link id; stale once the backend moves on.
    id: u64,
    /// Events from the backend.
    rx: mpsc::UnboundedReceiver<PeerEvent>,
    /// Shared backend state.
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Link for FakeLink {
    async fn send(&mut self, text: String) -> Result<()> {
        let mut s = self.state.lock();
        if s.current != Some(self.id) {
            return Err(Error::Socket("link closed".to_string()));
        }
        s.sent.push(Envelope::from_text(&text)?);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        match self.rx.recv().await? {
            PeerEvent::Frame(text) => Some(Ok(text)),
            PeerEvent::Close => None,
            PeerEvent::Fail => Some(Err(Error::Socket("connection reset".to_string()))),
        }
    }

    async fn close(&mut self) {
        let mut s = self.state.lock();
        if s.current == Some(self.id) {
            s.current = None;
            s.peer = None;
        }
    }
}

/// Let spawned tasks run for `ms` of (possibly paused) time.
pub async fn settle(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}
