//! Test support utilities for kp-editor tests.
//! Public so integration tests can observe what the editor components send.

use kp_client::Outbox;
use kp_protocol::{Outbound, OutboundKind};
use parking_lot::Mutex;

/// An [`Outbox`] that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingOutbox {
    /// Messages in posting order.
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingOutbox {
    /// Copy of every recorded message.
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    /// Take and forget every recorded message.
    pub fn take(&self) -> Vec<Outbound> {
        self.sent.lock().drain(..).collect()
    }

    /// Kinds of every recorded message.
    pub fn kinds(&self) -> Vec<OutboundKind> {
        self.sent.lock().iter().map(Outbound::kind).collect()
    }
}

impl Outbox for RecordingOutbox {
    fn post(&self, msg: Outbound) {
        self.sent.lock().push(msg);
    }
}
