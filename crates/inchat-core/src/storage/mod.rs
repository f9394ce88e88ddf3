//! Versioned entity storage (ports and the optimistic-concurrency store).
//!
//! - [`Backend`]: the persistence port implemented by inchat-infra (SQLite)
//!   and by [`memory::MemoryBackend`].
//! - [`EntityStore`]: the save / get / update / delete contract with
//!   version-checked writes.
//! - [`versioned::VersionedStore`]: the implementation of `EntityStore` over
//!   any `Backend`, including blocking wait-for-next-version.
//! - [`retry`]: rebase-and-retry helpers for callers that just want their
//!   change applied to whatever the latest version is.

pub mod memory;
pub mod retry;
pub mod versioned;
pub mod waiters;

use std::future::Future;

use inchat_types::error::StoreError;
use inchat_types::stored::{Identity, Stored};

/// Durable read/write of snapshots, keyed by identity.
///
/// A backend performs no version checks of its own; the store decides what
/// gets written. It owns durability and any integrity rules between related
/// entities (e.g. cascading deletes).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait Backend<T>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a brand-new entity.
    fn persist_new(
        &self,
        stored: &Stored<T>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Overwrite an existing entity with a new version.
    fn persist_version(
        &self,
        stored: &Stored<T>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Read the current snapshot. `None` if never created or deleted.
    fn fetch(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<Option<Stored<T>>, Self::Error>> + Send;

    /// Remove the entity. Later fetches return `None`.
    fn mark_deleted(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Optimistic-concurrency storage contract.
///
/// `update` and `delete` take the snapshot the caller last saw; the write
/// only goes through if that is still the authoritative version. Otherwise
/// the call fails with [`StoreError::Conflict`] carrying the latest
/// snapshot, or [`StoreError::Deleted`] if the entity is gone.
pub trait EntityStore<T>: Send + Sync {
    type Error;

    /// Create a new entity. Never conflicts.
    fn save(
        &self,
        value: T,
    ) -> impl Future<Output = Result<Stored<T>, StoreError<T, Self::Error>>> + Send;

    /// Fetch the current snapshot of an entity.
    fn get(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<Stored<T>, StoreError<T, Self::Error>>> + Send;

    /// Replace the value of `current`'s entity, if `current` is still the
    /// latest version. Returns the newly committed snapshot.
    fn update(
        &self,
        current: &Stored<T>,
        value: T,
    ) -> impl Future<Output = Result<Stored<T>, StoreError<T, Self::Error>>> + Send;

    /// Delete `current`'s entity, if `current` is still the latest version.
    fn delete(
        &self,
        current: &Stored<T>,
    ) -> impl Future<Output = Result<(), StoreError<T, Self::Error>>> + Send;
}
