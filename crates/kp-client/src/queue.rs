//! Two-tier outbound queue.

use std::collections::VecDeque;

use kp_protocol::{Envelope, OutboundKind};

/// Outbound envelopes waiting for an open socket.
///
/// Stop signals go to the high tier and always drain first. Each tier is FIFO.
#[derive(Debug, Default)]
pub struct SendQueue {
    /// High-priority tier.
    high: VecDeque<Envelope>,
    /// Everything else.
    normal: VecDeque<Envelope>,
}

impl SendQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `env` belongs in the high tier.
    fn is_high(env: &Envelope) -> bool {
        OutboundKind::try_from_str(&env.action).is_some_and(|k| k.is_high_priority())
    }

    /// Append `env` to the back of its tier.
    pub fn push(&mut self, env: Envelope) {
        if Self::is_high(&env) {
            self.high.push_back(env);
        } else {
            self.normal.push_back(env);
        }
    }

    /// Put `env` back at the front of its tier after a failed write.
    pub fn requeue(&mut self, env: Envelope) {
        if Self::is_high(&env) {
            self.high.push_front(env);
        } else {
            self.normal.push_front(env);
        }
    }

    /// Next envelope to write.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
    }
}
