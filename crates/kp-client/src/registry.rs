//! Fan-out of inbound messages to subscribers.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use kp_protocol::{Inbound, InboundKind};
use parking_lot::Mutex;
use tracing::{debug, error};

/// Callback invoked for every inbound message of a subscribed kind.
pub type Handler = Arc<dyn Fn(&Inbound) + Send + Sync>;

/// Identifies one registration; returned by [`Registry::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handlers keyed by inbound kind, in registration order.
#[derive(Clone, Default)]
pub struct Registry {
    /// Registered handlers.
    handlers: Arc<Mutex<HashMap<InboundKind, Vec<(HandlerId, Handler)>>>>,
    /// Source of fresh handler ids.
    next_id: Arc<AtomicU64>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Registering the same closure twice
    /// yields two independent registrations.
    pub fn on<F>(&self, kind: InboundKind, handler: F) -> HandlerId
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. No-op if it is not present.
    pub fn off(&self, kind: InboundKind, id: HandlerId) {
        let mut map = self.handlers.lock();
        if let Some(list) = map.get_mut(&kind) {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
            }
            if list.is_empty() {
                map.remove(&kind);
            }
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: InboundKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `msg` to every handler registered for its kind.
    ///
    /// Handlers run against a snapshot taken before the first call, so a
    /// handler may register or remove handlers (including itself) freely. A
    /// panicking handler is logged and the remaining handlers still run.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, msg: &Inbound) -> usize {
        let kind = msg.kind();
        let snapshot: Vec<(HandlerId, Handler)> = self
            .handlers
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        debug!(action = kind.as_str(), handlers = snapshot.len(), "dispatch");
        for (id, handler) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(msg))).is_err() {
                error!(action = kind.as_str(), handler = ?id, "handler panicked");
            }
        }
        snapshot.len()
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use kp_protocol::Reply;

    use super::*;

    fn saved() -> Inbound {
        Inbound::ProfileSaved(Reply::ok("saved"))
    }

    #[test]
    fn duplicates_fire_twice_and_off_removes_one() {
        let reg = Registry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = {
            let hits = hits.clone();
            move |_: &Inbound| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        };
        let a = reg.on(InboundKind::ProfileSaved, h.clone());
        reg.on(InboundKind::ProfileSaved, h);
        assert_eq!(reg.dispatch(&saved()), 2);
        reg.off(InboundKind::ProfileSaved, a);
        reg.off(InboundKind::ProfileSaved, a);
        assert_eq!(reg.dispatch(&saved()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn other_kinds_are_not_invoked() {
        let reg = Registry::new();
        reg.on(InboundKind::Profiles, |_| panic!("wrong kind"));
        assert_eq!(reg.dispatch(&saved()), 0);
    }

    #[test]
    fn handler_can_remove_itself_mid_dispatch() {
        let reg = Registry::new();
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::default();
        let id = {
            let reg2 = reg.clone();
            let slot = slot.clone();
            reg.on(InboundKind::ProfileSaved, move |_| {
                if let Some(id) = *slot.lock() {
                    reg2.off(InboundKind::ProfileSaved, id);
                }
            })
        };
        *slot.lock() = Some(id);
        assert_eq!(reg.dispatch(&saved()), 1);
        assert_eq!(reg.handler_count(InboundKind::ProfileSaved), 0);
        assert_eq!(reg.dispatch(&saved()), 0);
    }
}
