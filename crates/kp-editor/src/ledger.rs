//! Pending-change ledger for list-level macro edits.
//!
//! Holds the latest full snapshot of every macro edited since the last flush.
//! A flushed batch is kept as "in flight" until the backend confirms it, so a
//! failed batch can be put back instead of silently diverging.
//!
//! Replies carry no correlation id, so each `batchMacrosUpdated` reply is
//! matched to the oldest batch still awaiting one.

use std::collections::VecDeque;

use kp_protocol::{Macro, MacroId};
use tokio::time::Instant;
use tracing::{trace, warn};

/// Most batches kept awaiting a reply. Past this the oldest is forgotten.
pub const MAX_IN_FLIGHT: usize = 8;

/// One macro's pending snapshot.
#[derive(Debug, Clone)]
pub struct PendingChange {
    /// Macro the snapshot belongs to.
    pub macro_id: MacroId,
    /// Full snapshot at the time of the last edit.
    pub snapshot: Macro,
    /// When the snapshot was recorded.
    pub at: Instant,
}

/// A flushed batch awaiting its reply.
#[derive(Debug)]
enum InFlight {
    /// Sent since the last reload.
    Live(Vec<PendingChange>),
    /// Sent before a reload. Its reply is consumed and ignored.
    Stale,
}

/// Last-write-wins map of pending macro snapshots, in first-edit order.
#[derive(Debug, Default)]
pub struct PendingChanges {
    /// Unflushed snapshots.
    entries: Vec<PendingChange>,
    /// Flushed batches awaiting confirmation, oldest first.
    in_flight: VecDeque<InFlight>,
}

impl PendingChanges {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `snapshot`, replacing any earlier snapshot of the same macro.
    pub fn upsert(&mut self, snapshot: Macro) {
        let change = PendingChange {
            macro_id: snapshot.id.clone(),
            snapshot,
            at: Instant::now(),
        };
        match self.entries.iter_mut().find(|c| c.macro_id == change.macro_id) {
            Some(slot) => *slot = change,
            None => self.entries.push(change),
        }
        trace!(pending = self.entries.len(), "ledger_upsert");
    }

    /// Remove the pending snapshot for `id`, if any.
    pub fn remove(&mut self, id: &MacroId) -> Option<PendingChange> {
        let pos = self.entries.iter().position(|c| &c.macro_id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Take every pending snapshot for sending. The batch is remembered until
    /// [`confirm`](Self::confirm) or [`restore_failed`](Self::restore_failed).
    pub fn take_batch(&mut self) -> Vec<Macro> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let batch: Vec<PendingChange> = self.entries.drain(..).collect();
        let macros = batch.iter().map(|c| c.snapshot.clone()).collect();
        if self.in_flight.len() >= MAX_IN_FLIGHT
            && let Some(InFlight::Live(lost)) = self.in_flight.pop_front()
        {
            warn!(count = lost.len(), "forgetting unanswered batch");
        }
        self.in_flight.push_back(InFlight::Live(batch));
        macros
    }

    /// Pop the reply slot for the oldest batch. `None` when nothing was in
    /// flight or the batch was sent before the last [`clear`](Self::clear).
    fn next_reply(&mut self) -> Option<Vec<PendingChange>> {
        match self.in_flight.pop_front()? {
            InFlight::Live(batch) => Some(batch),
            InFlight::Stale => {
                trace!("reply to a batch from before the reload");
                None
            }
        }
    }

    /// The oldest in-flight batch was stored by the backend. Returns its
    /// size, or `None` when the reply belongs to no current batch.
    ///
    /// Assumes the backend answers batches in the order they were sent.
    pub fn confirm(&mut self) -> Option<usize> {
        self.next_reply().map(|b| b.len())
    }

    /// The oldest in-flight batch failed. Its snapshots go back into the
    /// ledger unless a newer edit of the same macro is already pending.
    /// Returns how many were put back, or `None` as for
    /// [`confirm`](Self::confirm).
    pub fn restore_failed(&mut self) -> Option<usize> {
        let batch = self.next_reply()?;
        let mut restored = 0;
        for change in batch {
            if !self.contains(&change.macro_id) {
                self.entries.push(change);
                restored += 1;
            }
        }
        Some(restored)
    }

    /// Drop every pending snapshot. Batches already sent are kept as stale
    /// slots so their replies still line up.
    pub fn clear(&mut self) {
        self.entries.clear();
        for slot in &mut self.in_flight {
            *slot = InFlight::Stale;
        }
    }

    /// Whether `id` has a pending snapshot.
    pub fn contains(&self, id: &MacroId) -> bool {
        self.entries.iter().any(|c| &c.macro_id == id)
    }

    /// Pending snapshot for `id`.
    pub fn get(&self, id: &MacroId) -> Option<&PendingChange> {
        self.entries.iter().find(|c| &c.macro_id == id)
    }

    /// Number of pending snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of batches awaiting confirmation.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
