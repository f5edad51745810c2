//! Keyed one-shot timers with cancellation.
//!
//! Scheduling a key that is already pending replaces the earlier timer, which
//! is what both the send cooldown and the ledger flush debounce need.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A pending timer.
struct Entry {
    /// Cancels the sleeping task.
    token: CancellationToken,
    /// Distinguishes this timer from a later one scheduled for the same key.
    generation: u64,
}

/// Schedules closures to run once after a delay, at most one per key.
///
/// Must be used from within a tokio runtime.
pub struct Deferred<K> {
    /// Pending timers.
    entries: Arc<Mutex<HashMap<K, Entry>>>,
    /// Generation counter.
    next: Arc<AtomicU64>,
}

impl<K> Clone for Deferred<K> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            next: self.next.clone(),
        }
    }
}

impl<K> Default for Deferred<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> Deferred<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create an empty timer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` after `delay`, replacing any timer pending for `key`.
    pub fn schedule<F>(&self, key: K, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let cancel = token.clone();
        if let Some(old) = self
            .entries
            .lock()
            .insert(key.clone(), Entry { token, generation })
        {
            old.token.cancel();
        }

        let entries = self.entries.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    trace!("deferred_cancelled");
                    return;
                }
            }
            {
                let mut map = entries.lock();
                match map.get(&key) {
                    Some(e) if e.generation == generation => {
                        map.remove(&key);
                    }
                    _ => return,
                }
            }
            f();
        });
    }

    /// Cancel the timer for `key`. Returns true if one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.entries.lock().remove(key) {
            Some(e) => {
                e.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        for (_, e) in self.entries.lock().drain() {
            e.token.cancel();
        }
    }

    /// Whether a timer is pending for `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending_timer() {
        let d = Deferred::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for n in 1..=3 {
            let hits = hits.clone();
            d.schedule("k", Duration::from_millis(100), move || {
                hits.store(n, Ordering::SeqCst);
            });
            time::sleep(Duration::from_millis(50)).await;
        }
        assert!(d.is_pending(&"k"));
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!d.is_pending(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let d = Deferred::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        d.schedule(1u8, Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(d.cancel(&1));
        assert!(!d.cancel(&1));
        let h = hits.clone();
        d.schedule(2u8, Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        d.cancel_all();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
