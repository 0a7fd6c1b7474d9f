//! One-shot completion listeners for asynchronous platform signals.
//!
//! The downloader and the installer report completion outside the caller's
//! stack, like a broadcast that any registered receiver may observe. A
//! [`SignalHub`] is that broadcast source; a stage that needs to wait for one
//! signal calls [`SignalHub::register`] and gets a [`Registration`] back.
//!
//! A registration is a scoped guard: it is removed from the hub exactly once,
//! either through [`Registration::unregister`] or when it is dropped. The hub
//! counts registrations and unregistrations so listener leaks are observable.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Counters of listener registrations on a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStats {
    /// Listeners ever registered
    pub registered: u64,
    /// Listeners ever unregistered
    pub unregistered: u64,
}

impl ListenerStats {
    /// Listeners registered but not yet unregistered.
    pub fn active(&self) -> u64 {
        self.registered - self.unregistered
    }
}

struct HubState<T> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: DashMap<u64, mpsc::UnboundedSender<T>>,
    registered: AtomicU64,
    unregistered: AtomicU64,
}

/// Broadcast source for one kind of completion signal.
///
/// Cloning a hub yields another handle to the same listener set.
pub struct SignalHub<T> {
    state: Arc<HubState<T>>,
}

impl<T> Clone for SignalHub<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for SignalHub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("name", &self.state.name)
            .field("active", &self.state.listeners.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> SignalHub<T> {
    /// Create a hub; `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            state: Arc::new(HubState {
                name,
                next_id: AtomicU64::new(0),
                listeners: DashMap::new(),
                registered: AtomicU64::new(0),
                unregistered: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener that receives every signal broadcast from now on.
    pub fn register(&self) -> Registration<T> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        if !self.state.listeners.is_empty() {
            warn!(
                hub = self.state.name,
                active = self.state.listeners.len(),
                "Registering a listener while another one is still active"
            );
        }

        self.state.listeners.insert(id, sender);
        self.state.registered.fetch_add(1, Ordering::SeqCst);
        debug!(hub = self.state.name, listener = id, "Listener registered");

        Registration {
            id,
            hub: self.clone(),
            receiver,
            released: false,
        }
    }

    /// Deliver `signal` to every registered listener.
    ///
    /// Returns the number of listeners the signal was delivered to.
    pub fn broadcast(&self, signal: T) -> usize {
        let mut delivered = 0;
        for entry in self.state.listeners.iter() {
            if entry.value().send(signal.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(hub = self.state.name, delivered, "Signal broadcast");
        delivered
    }

    /// Number of listeners currently registered.
    pub fn active_listeners(&self) -> usize {
        self.state.listeners.len()
    }

    /// Registration counters since the hub was created.
    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            registered: self.state.registered.load(Ordering::SeqCst),
            unregistered: self.state.unregistered.load(Ordering::SeqCst),
        }
    }

    fn remove(&self, id: u64) {
        if self.state.listeners.remove(&id).is_some() {
            self.state.unregistered.fetch_add(1, Ordering::SeqCst);
            debug!(hub = self.state.name, listener = id, "Listener unregistered");
        }
    }
}

/// A pending wait for a signal from a [`SignalHub`].
///
/// Dropping the registration unregisters it; calling [`unregister`](Self::unregister)
/// does the same explicitly. Either way the hub sees exactly one unregistration.
pub struct Registration<T: Clone + Send + 'static> {
    id: u64,
    hub: SignalHub<T>,
    receiver: mpsc::UnboundedReceiver<T>,
    released: bool,
}

impl<T: Clone + Send + 'static> Registration<T> {
    /// Wait for the next signal.
    ///
    /// Returns `None` once the registration has been released.
    pub async fn recv(&mut self) -> Option<T> {
        if self.released {
            return None;
        }
        self.receiver.recv().await
    }

    /// Wait for the first signal accepted by `filter`, skipping all others.
    pub async fn recv_matching<F>(&mut self, mut filter: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        while let Some(signal) = self.recv().await {
            if filter(&signal) {
                return Some(signal);
            }
            debug!(hub = self.hub.state.name, listener = self.id, "Ignoring unrelated signal");
        }
        None
    }

    /// Remove this listener from its hub.
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.receiver.close();
            self.hub.remove(self.id);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Registration<T> {
    fn drop(&mut self) {
        self.release();
    }
}
