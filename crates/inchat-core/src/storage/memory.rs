//! In-process `Backend` backed by `DashMap`.
//!
//! Used by tests and as a scratch store. Deleted entities leave a tombstone
//! so a deleted identity can never be persisted again. The backend can be
//! switched "unavailable" to exercise backend-failure paths.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use inchat_types::stored::{Identity, Stored};
use thiserror::Error;

use super::Backend;

/// Errors from [`MemoryBackend`].
#[derive(Debug, Error)]
pub enum MemoryBackendError {
    #[error("memory backend unavailable")]
    Unavailable,

    #[error("entity {0} already exists")]
    Duplicate(Identity),

    #[error("entity {0} does not exist")]
    Missing(Identity),
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Live(Stored<T>),
    Tombstone,
}

/// `DashMap`-backed storage for any cloneable value.
pub struct MemoryBackend<T> {
    entries: DashMap<Identity, Slot<T>>,
    unavailable: AtomicBool,
}

impl<T: Clone> MemoryBackend<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with `Unavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn check_available(&self) -> Result<(), MemoryBackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MemoryBackendError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// All live snapshots, oldest identity first.
    ///
    /// Identities are UUID v7, so this is creation order.
    pub fn snapshots(&self) -> Vec<Stored<T>> {
        let mut live: Vec<Stored<T>> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Live(stored) => Some(stored.clone()),
                Slot::Tombstone => None,
            })
            .collect();
        live.sort_by_key(Stored::identity);
        live
    }

    /// Live snapshots matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Vec<Stored<T>> {
        self.snapshots()
            .into_iter()
            .filter(|stored| predicate(stored.value()))
            .collect()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for MemoryBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Backend<T> for MemoryBackend<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = MemoryBackendError;

    async fn persist_new(&self, stored: &Stored<T>) -> Result<(), MemoryBackendError> {
        self.check_available()?;
        match self.entries.entry(stored.identity()) {
            Entry::Occupied(_) => Err(MemoryBackendError::Duplicate(stored.identity())),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Live(stored.clone()));
                Ok(())
            }
        }
    }

    async fn persist_version(&self, stored: &Stored<T>) -> Result<(), MemoryBackendError> {
        self.check_available()?;
        match self.entries.get_mut(&stored.identity()) {
            Some(mut slot) if matches!(*slot, Slot::Live(_)) => {
                *slot = Slot::Live(stored.clone());
                Ok(())
            }
            _ => Err(MemoryBackendError::Missing(stored.identity())),
        }
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<T>>, MemoryBackendError> {
        self.check_available()?;
        Ok(self.entries.get(&identity).and_then(|slot| match slot.value() {
            Slot::Live(stored) => Some(stored.clone()),
            Slot::Tombstone => None,
        }))
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), MemoryBackendError> {
        self.check_available()?;
        self.entries.insert(identity, Slot::Tombstone);
        Ok(())
    }
}
