//! Transport layer for the KPMacros editor.
//!
//! - [`Client`]: one reconnecting connection to the backend. Outbound frames
//!   go through a two-tier queue that survives disconnects; inbound frames are
//!   decoded and fanned out through a [`Registry`].
//! - [`Session`]: a consumer-scoped view of a client with per-action send
//!   cooldowns, one-shot requests and automatic handler cleanup.
//! - [`ClientConfig`]: endpoint selection and timing, from defaults, a RON
//!   file and the environment.
//!
//! Connection lifecycle
//! - Nothing connects until [`Client::open`] or the first send.
//! - A lost connection is retried with capped exponential backoff. After the
//!   attempt ceiling the client reports [`ConnectionEvent::GaveUp`] and waits
//!   for an explicit [`Client::open`] or [`Client::reconnect`].
//! - Frames sent while offline are kept and written in priority order once
//!   the connection opens.

use kp_protocol::Outbound;

mod client;
pub mod config;
pub mod connector;
mod error;
mod queue;
mod registry;
mod session;
pub mod test_support;
mod timer;

pub use client::{Client, ConnectionEvent, ConnectionState};
pub use config::{ClientConfig, Environment};
pub use error::{Error, Result};
pub use registry::{Handler, HandlerId, Registry};
pub use session::Session;
pub use timer::Deferred;

/// Anything that can deliver outbound messages to the backend.
pub trait Outbox: Send + Sync {
    /// Hand `msg` to the transport. Delivery failures are never reported here.
    fn post(&self, msg: Outbound);
}

impl Outbox for Client {
    fn post(&self, msg: Outbound) {
        self.send(&msg);
    }
}

impl Outbox for Session {
    fn post(&self, msg: Outbound) {
        self.client().send(&msg);
    }
}
