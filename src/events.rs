//! Change notification bus.
//!
//! The engine calls [`ChangeBus::emit`] once after every committed mutation.
//! Synchronous listeners registered with [`ChangeBus::on_changed`] run in
//! registration order on the emitting thread; async consumers can follow the
//! same stream through [`ChangeBus::subscribe`].

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed {
    /// Monotonic counter, starting at 1 for the first emission.
    pub revision: u64,
}

type Listener = Arc<dyn Fn(&Changed) + Send + Sync>;

struct BusInner {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    revision: AtomicU64,
    tx: broadcast::Sender<Changed>,
}

impl BusInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out point for change notifications. Clones share listeners.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listener_count())
            .field("revision", &self.revision())
            .finish()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    /// Bus with the default broadcast capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Bus whose broadcast channel buffers `capacity` events per receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                revision: AtomicU64::new(0),
                tx,
            }),
        }
    }

    /// Registers `callback` until the returned [`Subscription`] is dropped.
    pub fn on_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Changed) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Receiver for every emission after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Changed> {
        self.inner.tx.subscribe()
    }

    /// Notifies every listener and broadcast receiver.
    pub fn emit(&self) -> Changed {
        let changed = Changed {
            revision: self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let snapshot: Vec<(u64, Listener)> = self.inner.listeners().clone();
        for (id, listener) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&changed)));
            if outcome.is_err() {
                tracing::warn!(listener = id, revision = changed.revision, "change listener panicked");
            }
        }
        // No receivers is fine.
        let _ = self.inner.tx.send(changed);
        changed
    }

    /// Revision of the latest emission, 0 before the first.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Number of registered synchronous listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

/// Registration handle returned by [`ChangeBus::on_changed`].
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    bus: Weak<BusInner>,
    id: Option<u64>,
}

impl Subscription {
    /// Removes the listener now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(bus) = self.bus.upgrade() {
            bus.listeners().retain(|(lid, _)| *lid != id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = ChangeBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = {
            let seen = seen.clone();
            bus.on_changed(move |_| seen.lock().unwrap().push("a"))
        };
        let b = {
            let seen = seen.clone();
            bus.on_changed(move |_| seen.lock().unwrap().push("b"))
        };
        bus.emit();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        drop((a, b));
    }

    #[test]
    fn unsubscribe_and_drop_both_detach() {
        let bus = ChangeBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let first = {
            let hits = hits.clone();
            bus.on_changed(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let hits = hits.clone();
            bus.on_changed(move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        bus.emit();
        first.unsubscribe();
        bus.emit();
        drop(second);
        bus.emit();
        assert_eq!(hits.load(Ordering::SeqCst), 21);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let bus = ChangeBus::new();
        let reached = Arc::new(AtomicU64::new(0));
        let _bad = bus.on_changed(|_| panic!("listener failure"));
        let _good = {
            let reached = reached.clone();
            bus.on_changed(move |changed| {
                reached.store(changed.revision, Ordering::SeqCst);
            })
        };
        let changed = bus.emit();
        assert_eq!(changed.revision, 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn broadcast_receivers_see_revisions() {
        let bus = ChangeBus::with_capacity(8);
        let mut rx = bus.subscribe();
        bus.emit();
        bus.emit();
        assert_eq!(rx.try_recv().unwrap().revision, 1);
        assert_eq!(rx.try_recv().unwrap().revision, 2);
        assert_eq!(bus.revision(), 2);
    }
}
