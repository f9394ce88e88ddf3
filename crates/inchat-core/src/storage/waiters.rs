//! Registry of tasks waiting for the next version of an entity.
//!
//! Waiting is wake-on-write: a waiter registers a oneshot slot for an
//! identity, and the store fulfils every slot for that identity when it
//! commits an update or delete. All bookkeeping sits behind one short
//! `std::sync::Mutex`; nothing inside the critical section awaits or does
//! I/O.
//!
//! Fulfilment removes the identity's whole slot list under the lock before
//! anything is sent, so a slot is delivered at most once. A waiter that
//! re-registers afterwards gets a fresh slot for the next round.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use inchat_types::stored::{Identity, Stored};
use tokio::sync::oneshot;
use tracing::debug;

/// What a waiter is woken with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// A new version was committed.
    Version(Stored<T>),
    /// The entity was deleted.
    Deleted,
}

struct Slot<T> {
    ticket: u64,
    sender: oneshot::Sender<Delivery<T>>,
}

struct RegistryState<T> {
    next_ticket: u64,
    pending: HashMap<Identity, Vec<Slot<T>>>,
}

/// Per-identity sets of pending waiters.
pub struct WaiterRegistry<T> {
    state: Mutex<RegistryState<T>>,
}

impl<T> WaiterRegistry<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_ticket: 0,
                pending: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for the next commit on `identity`.
    ///
    /// The returned handle deregisters itself when dropped, so abandoning a
    /// wait (timeout, cancellation, task abort) never leaks a slot.
    pub fn register(&self, identity: Identity) -> Waiter<'_, T> {
        let (sender, receiver) = oneshot::channel();
        let ticket = {
            let mut state = self.lock();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state
                .pending
                .entry(identity)
                .or_default()
                .push(Slot { ticket, sender });
            ticket
        };
        debug!(%identity, ticket, "registered waiter");
        Waiter {
            registry: self,
            identity,
            ticket,
            receiver,
        }
    }

    /// Number of waiters currently registered for `identity`.
    pub fn pending_waiters(&self, identity: Identity) -> usize {
        self.lock().pending.get(&identity).map_or(0, Vec::len)
    }

    /// True if no waiter is registered for any identity.
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn take(&self, identity: Identity) -> Vec<Slot<T>> {
        self.lock().pending.remove(&identity).unwrap_or_default()
    }

    fn deregister(&self, identity: Identity, ticket: u64) {
        let mut state = self.lock();
        if let Some(slots) = state.pending.get_mut(&identity) {
            slots.retain(|slot| slot.ticket != ticket);
            if slots.is_empty() {
                state.pending.remove(&identity);
            }
        }
    }

    /// Wake every waiter on `identity` with `Deleted`. Returns how many
    /// slots were fulfilled.
    pub fn deliver_deleted(&self, identity: Identity) -> usize {
        let slots = self.take(identity);
        let count = slots.len();
        for slot in slots {
            // The receiver may already be gone (cancelled, not yet dropped).
            let _ = slot.sender.send(Delivery::Deleted);
        }
        if count > 0 {
            debug!(%identity, count, "woke waiters on delete");
        }
        count
    }
}

impl<T: Clone> WaiterRegistry<T> {
    /// Wake every waiter on the snapshot's identity with that snapshot.
    /// Returns how many slots were fulfilled.
    pub fn deliver(&self, stored: &Stored<T>) -> usize {
        let identity = stored.identity();
        let slots = self.take(identity);
        let count = slots.len();
        for slot in slots {
            let _ = slot.sender.send(Delivery::Version(stored.clone()));
        }
        if count > 0 {
            debug!(%identity, version = %stored.version(), count, "woke waiters on update");
        }
        count
    }
}

impl<T> Default for WaiterRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for WaiterRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("WaiterRegistry")
            .field("identities", &state.pending.len())
            .field(
                "waiters",
                &state.pending.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

/// A registered, single-use wait for one identity.
pub struct Waiter<'a, T> {
    registry: &'a WaiterRegistry<T>,
    identity: Identity,
    ticket: u64,
    receiver: oneshot::Receiver<Delivery<T>>,
}

impl<T> Waiter<'_, T> {
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Suspend until this slot is fulfilled.
    ///
    /// Returns `None` only if the registry was torn down without delivering.
    pub async fn delivered(mut self) -> Option<Delivery<T>> {
        (&mut self.receiver).await.ok()
    }
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        // No-op if delivery already removed the slot.
        self.registry.deregister(self.identity, self.ticket);
    }
}
