//! `EntityStore` implementation with per-identity compare-and-swap and
//! blocking wait-for-next-version.
//!
//! Writes to one identity are serialized by a per-identity async mutex held
//! only around fetch-compare-persist-notify. Writes to different identities
//! never contend. Lock entries are removed as soon as no task holds or waits
//! for them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use inchat_types::error::StoreError;
use inchat_types::stored::{Identity, Stored, Version};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::waiters::{Delivery, WaiterRegistry};
use super::{Backend, EntityStore};

/// Versioned store over a persistence [`Backend`].
pub struct VersionedStore<T, B> {
    backend: B,
    write_locks: DashMap<Identity, Arc<Mutex<()>>>,
    waiters: WaiterRegistry<T>,
}

/// Holds one identity's write lock; drops the map entry when unused.
struct WriteGuard<'a> {
    locks: &'a DashMap<Identity, Arc<Mutex<()>>>,
    identity: Identity,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Release before checking the count: the guard holds its own Arc.
        self.guard.take();
        self.locks
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<T, B> VersionedStore<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Backend<T>,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_locks: DashMap::new(),
            waiters: WaiterRegistry::new(),
        }
    }

    /// The persistence backend, for backend-specific queries.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn waiters(&self) -> &WaiterRegistry<T> {
        &self.waiters
    }

    async fn lock_identity(&self, identity: Identity) -> WriteGuard<'_> {
        // Clone the Arc out so no DashMap guard is held across the await.
        let lock = self.write_locks.entry(identity).or_default().clone();
        let guard = lock.lock_owned().await;
        WriteGuard {
            locks: &self.write_locks,
            identity,
            guard: Some(guard),
        }
    }

    /// Fetch the authoritative snapshot for a write. A missing entity was
    /// deleted: the caller holds a snapshot, so it existed once.
    async fn fetch_for_write(
        &self,
        current: &Stored<T>,
    ) -> Result<Stored<T>, StoreError<T, B::Error>> {
        let identity = current.identity();
        let latest = self
            .backend
            .fetch(identity)
            .await
            .map_err(StoreError::Backend)?
            .ok_or(StoreError::Deleted)?;
        if latest.version() != current.version() {
            debug!(
                %identity,
                expected = %current.version(),
                actual = %latest.version(),
                "version conflict"
            );
            return Err(StoreError::conflict(latest));
        }
        Ok(latest)
    }

    /// Suspend until `identity` has a version other than `observed`, then
    /// return that snapshot.
    ///
    /// Returns immediately if the version already differs. The waiter is
    /// registered *before* the current version is checked, so a commit
    /// landing between the check and the wait still wakes it. Fails with
    /// `NotFound` if the entity does not exist at call time and with
    /// `Deleted` if it is deleted while waiting.
    ///
    /// Dropping the returned future deregisters the waiter.
    pub async fn wait_next_version(
        &self,
        identity: Identity,
        observed: Version,
    ) -> Result<Stored<T>, StoreError<T, B::Error>> {
        let waiter = self.waiters.register(identity);

        let current = self
            .backend
            .fetch(identity)
            .await
            .map_err(StoreError::Backend)?
            .ok_or(StoreError::NotFound)?;
        if current.version() != observed {
            return Ok(current);
        }

        debug!(%identity, version = %observed, "waiting for next version");
        match waiter.delivered().await {
            Some(Delivery::Version(next)) => Ok(next),
            Some(Delivery::Deleted) | None => Err(StoreError::Deleted),
        }
    }

    /// [`wait_next_version`](Self::wait_next_version) with a deadline.
    /// `Ok(None)` means the deadline passed with no new version.
    pub async fn wait_next_version_timeout(
        &self,
        identity: Identity,
        observed: Version,
        timeout: Duration,
    ) -> Result<Option<Stored<T>>, StoreError<T, B::Error>> {
        match tokio::time::timeout(timeout, self.wait_next_version(identity, observed)).await {
            Ok(result) => result.map(Some),
            Err(_) => {
                debug!(%identity, ?timeout, "wait for next version timed out");
                Ok(None)
            }
        }
    }

    /// [`wait_next_version`](Self::wait_next_version) that gives up when
    /// `cancel` fires. `Ok(None)` means it was cancelled.
    pub async fn wait_next_version_cancellable(
        &self,
        identity: Identity,
        observed: Version,
        cancel: &CancellationToken,
    ) -> Result<Option<Stored<T>>, StoreError<T, B::Error>> {
        tokio::select! {
            result = self.wait_next_version(identity, observed) => result.map(Some),
            _ = cancel.cancelled() => {
                debug!(%identity, "wait for next version cancelled");
                Ok(None)
            }
        }
    }
}

impl<T, B> EntityStore<T> for VersionedStore<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Backend<T>,
{
    type Error = B::Error;

    async fn save(&self, value: T) -> Result<Stored<T>, StoreError<T, B::Error>> {
        let stored = Stored::new(value);
        self.backend
            .persist_new(&stored)
            .await
            .map_err(StoreError::Backend)?;
        debug!(identity = %stored.identity(), version = %stored.version(), "saved new entity");
        Ok(stored)
    }

    async fn get(&self, identity: Identity) -> Result<Stored<T>, StoreError<T, B::Error>> {
        self.backend
            .fetch(identity)
            .await
            .map_err(StoreError::Backend)?
            .ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        current: &Stored<T>,
        value: T,
    ) -> Result<Stored<T>, StoreError<T, B::Error>> {
        let _guard = self.lock_identity(current.identity()).await;
        let latest = self.fetch_for_write(current).await?;

        let updated = latest.new_version(value);
        self.backend
            .persist_version(&updated)
            .await
            .map_err(StoreError::Backend)?;
        debug!(identity = %updated.identity(), version = %updated.version(), "committed update");

        self.waiters.deliver(&updated);
        Ok(updated)
    }

    async fn delete(&self, current: &Stored<T>) -> Result<(), StoreError<T, B::Error>> {
        let identity = current.identity();
        let _guard = self.lock_identity(identity).await;
        self.fetch_for_write(current).await?;

        self.backend
            .mark_deleted(identity)
            .await
            .map_err(StoreError::Backend)?;
        debug!(%identity, "deleted entity");

        self.waiters.deliver_deleted(identity);
        Ok(())
    }
}

impl<T, B> std::fmt::Debug for VersionedStore<T, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("locked_identities", &self.write_locks.len())
            .field("waiters", &self.waiters)
            .finish()
    }
}
