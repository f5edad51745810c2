//! The macro roster of one profile, with batched autosave of list-level
//! edits.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use kp_client::{Deferred, Outbox, Session};
use kp_protocol::{Inbound, InboundKind, LoopMode, Macro, MacroId, Outbound, Reply};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{EditError, Result, ledger::PendingChanges};

/// Delay between the last list-level edit and the batched write.
pub const FLUSH_DELAY: Duration = Duration::from_secs(10);

/// Capacity of the roster event channel.
const EVENT_CAPACITY: usize = 32;

/// Notifications from a [`MacroRoster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    /// The roster was replaced from the backend.
    Loaded {
        /// Number of macros.
        count: usize,
    },
    /// A batch of pending edits was sent.
    Flushed {
        /// Number of macros in the batch.
        count: usize,
    },
    /// The backend stored a batch.
    BatchSaved,
    /// The backend rejected a batch; its snapshots were put back.
    BatchFailed {
        /// Failure text from the reply.
        message: String,
        /// Snapshots returned to the ledger.
        replayed: usize,
    },
}

/// Mutable roster state.
struct RosterState {
    /// Profile the roster belongs to.
    profile: String,
    /// Authoritative list with local edits applied.
    macros: Vec<Macro>,
    /// Edits not yet written.
    ledger: PendingChanges,
}

/// State shared with timers and handlers.
struct Shared {
    /// Roster state.
    state: Mutex<RosterState>,
    /// Delivery path.
    outbox: Arc<dyn Outbox>,
    /// Notifications.
    events: broadcast::Sender<RosterEvent>,
}

impl Shared {
    /// Notify subscribers. Having none is fine.
    fn emit(&self, ev: RosterEvent) {
        if self.events.send(ev).is_err() {
            debug!("no roster subscribers");
        }
    }

    /// Send every pending snapshot as one batch.
    fn flush(&self) -> usize {
        let (profile, macros) = {
            let mut s = self.state.lock();
            (s.profile.clone(), s.ledger.take_batch())
        };
        if macros.is_empty() {
            return 0;
        }
        let count = macros.len();
        info!(profile = %profile, count, "flushing pending macro edits");
        self.outbox.post(Outbound::BatchUpdateMacros { profile, macros });
        self.emit(RosterEvent::Flushed { count });
        count
    }
}

/// Owns one profile's macro list and the ledger of list-level edits.
///
/// Toggling a macro or changing its loop mode updates the local list at once
/// and schedules a batched `batchUpdateMacros` write; further edits within
/// [`FLUSH_DELAY`] push the write back. Must be used from within a tokio
/// runtime.
pub struct MacroRoster {
    /// Shared state.
    shared: Arc<Shared>,
    /// Flush debounce timer.
    timer: Deferred<()>,
    /// Debounce delay.
    flush_delay: Duration,
}

impl MacroRoster {
    /// Create an empty roster for `profile`.
    pub fn new(outbox: Arc<dyn Outbox>, profile: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RosterState {
                    profile: profile.to_string(),
                    macros: Vec::new(),
                    ledger: PendingChanges::new(),
                }),
                outbox,
                events,
            }),
            timer: Deferred::new(),
            flush_delay: FLUSH_DELAY,
        }
    }

    /// Override the flush delay.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Route `macros` and `batchMacrosUpdated` from `session` into this
    /// roster. The registrations end with the session.
    pub fn attach(&self, session: &Session) {
        for kind in [InboundKind::Macros, InboundKind::BatchMacrosUpdated] {
            let weak: Weak<Shared> = Arc::downgrade(&self.shared);
            let timer = self.timer.clone();
            let delay = self.flush_delay;
            session.on(kind, move |msg| {
                if let Some(shared) = weak.upgrade() {
                    handle(&shared, &timer, delay, msg);
                }
            });
        }
    }

    /// Apply an inbound message.
    pub fn handle(&self, msg: &Inbound) {
        handle(&self.shared, &self.timer, self.flush_delay, msg);
    }

    /// Subscribe to roster notifications.
    pub fn events(&self) -> broadcast::Receiver<RosterEvent> {
        self.shared.events.subscribe()
    }

    /// Profile this roster belongs to.
    pub fn profile(&self) -> String {
        self.shared.state.lock().profile.clone()
    }

    /// Request the macro list from the backend.
    pub fn load(&self) {
        let profile = self.profile();
        self.shared.outbox.post(Outbound::GetMacros { profile });
    }

    /// Switch to another profile. Pending edits of the current profile are
    /// flushed first.
    pub fn set_profile(&self, profile: &str) {
        self.flush();
        {
            let mut s = self.shared.state.lock();
            s.profile = profile.to_string();
            s.macros.clear();
        }
        self.load();
    }

    /// Snapshot of the current list.
    pub fn macros(&self) -> Vec<Macro> {
        self.shared.state.lock().macros.clone()
    }

    /// Look a macro up by name.
    pub fn find(&self, name: &str) -> Option<Macro> {
        self.shared
            .state
            .lock()
            .macros
            .iter()
            .find(|m| m.name == name)
            .cloned()
    }

    /// Number of pending (unflushed) snapshots.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().ledger.len()
    }

    /// Whether a flush is scheduled.
    pub fn flush_scheduled(&self) -> bool {
        self.timer.is_pending(&())
    }

    /// Apply `f` to the macro with `id` and record the result as pending.
    fn edit<T>(&self, id: &MacroId, f: impl FnOnce(&mut Macro) -> T) -> Result<T> {
        let (out, snapshot) = {
            let mut s = self.shared.state.lock();
            let m = s
                .macros
                .iter_mut()
                .find(|m| &m.id == id)
                .ok_or_else(|| EditError::UnknownMacro(id.to_string()))?;
            let out = f(m);
            (out, m.clone())
        };
        self.add_pending_change(snapshot);
        Ok(out)
    }

    /// Flip `enabled`. Returns the new value.
    pub fn toggle_enabled(&self, id: &MacroId) -> Result<bool> {
        self.edit(id, |m| {
            m.enabled = !m.enabled;
            m.enabled
        })
    }

    /// Set the loop mode.
    pub fn set_loop_mode(&self, id: &MacroId, mode: LoopMode) -> Result<()> {
        self.edit(id, |m| m.loop_mode = mode)
    }

    /// Record `snapshot` in the ledger and restart the flush timer.
    pub fn add_pending_change(&self, snapshot: Macro) {
        self.shared.state.lock().ledger.upsert(snapshot);
        schedule_flush(&self.shared, &self.timer, self.flush_delay);
    }

    /// Delete a macro locally and on the backend. Its pending snapshot, if
    /// any, is discarded.
    pub fn delete_macro(&self, id: &MacroId) -> Result<()> {
        let (profile, name) = {
            let mut s = self.shared.state.lock();
            let pos = s
                .macros
                .iter()
                .position(|m| &m.id == id)
                .ok_or_else(|| EditError::UnknownMacro(id.to_string()))?;
            let removed = s.macros.remove(pos);
            s.ledger.remove(id);
            (s.profile.clone(), removed.name)
        };
        self.shared
            .outbox
            .post(Outbound::DeleteMacro { profile, name });
        Ok(())
    }

    /// Write pending edits now. Returns the batch size.
    pub fn flush(&self) -> usize {
        self.timer.cancel(&());
        self.shared.flush()
    }

    /// Flush before handing a macro to the editor, so the editor starts from
    /// what the backend will hold.
    pub fn flush_before_edit(&self, name: &str) -> Option<Macro> {
        self.flush();
        self.find(name)
    }

    /// Cancel the flush timer without writing.
    pub fn dispose(&self) {
        self.timer.cancel_all();
    }
}

impl Drop for MacroRoster {
    fn drop(&mut self) {
        self.timer.cancel_all();
    }
}

/// Restart the debounce timer.
fn schedule_flush(shared: &Arc<Shared>, timer: &Deferred<()>, delay: Duration) {
    let weak = Arc::downgrade(shared);
    timer.schedule((), delay, move || {
        if let Some(shared) = weak.upgrade() {
            shared.flush();
        }
    });
}

/// Inbound message handling shared by [`MacroRoster::handle`] and the
/// session handlers.
fn handle(shared: &Arc<Shared>, timer: &Deferred<()>, delay: Duration, msg: &Inbound) {
    match msg {
        Inbound::Macros(list) => {
            timer.cancel(&());
            let count = list.len();
            {
                let mut s = shared.state.lock();
                if !s.ledger.is_empty() {
                    debug!(dropped = s.ledger.len(), "reload discards pending edits");
                }
                s.macros = list.clone();
                s.ledger.clear();
            }
            shared.emit(RosterEvent::Loaded { count });
        }
        Inbound::BatchMacrosUpdated(reply) => on_batch_reply(shared, timer, delay, reply),
        _ => {}
    }
}

/// Confirm or replay the oldest in-flight batch. Replies to batches sent
/// before the last reload are dropped without an event.
fn on_batch_reply(shared: &Arc<Shared>, timer: &Deferred<()>, delay: Duration, reply: &Reply) {
    match reply.error_text() {
        None => {
            let Some(count) = shared.state.lock().ledger.confirm() else {
                debug!("ignoring reply to a discarded batch");
                return;
            };
            debug!(count, "batch stored");
            shared.emit(RosterEvent::BatchSaved);
        }
        Some(message) => {
            let Some(replayed) = shared.state.lock().ledger.restore_failed() else {
                debug!(%message, "ignoring failure of a discarded batch");
                return;
            };
            warn!(%message, replayed, "batch update failed");
            if replayed > 0 {
                schedule_flush(shared, timer, delay);
            }
            shared.emit(RosterEvent::BatchFailed { message, replayed });
        }
    }
}
