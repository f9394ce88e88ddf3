//! Rebase-and-retry helpers over any [`EntityStore`].
//!
//! Both loops are unbounded. Under sustained contention on one identity a
//! caller can keep losing the race and starve; callers that cannot accept
//! that should use `update`/`delete` directly and decide for themselves.

use inchat_types::error::StoreError;
use inchat_types::stored::Stored;
use tracing::debug;

use super::EntityStore;

/// Apply `transform` to the latest version of `stored`'s entity until the
/// write commits.
///
/// On `Conflict` the transform is re-run against the snapshot carried by
/// the conflict. `Deleted` and backend failures end the loop immediately.
/// `transform` must be pure: it may run any number of times.
pub async fn update_until_success<T, S, F>(
    store: &S,
    stored: Stored<T>,
    transform: F,
) -> Result<Stored<T>, StoreError<T, S::Error>>
where
    S: EntityStore<T>,
    F: Fn(&T) -> T,
{
    let mut current = stored;
    loop {
        let next = transform(current.value());
        match store.update(&current, next).await {
            Ok(updated) => return Ok(updated),
            Err(StoreError::Conflict { latest }) => {
                debug!(
                    identity = %latest.identity(),
                    version = %latest.version(),
                    "update conflicted, rebasing"
                );
                current = *latest;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delete `stored`'s entity whatever its latest version is.
///
/// Succeeds if the entity is already gone, so two racing deletes of the
/// same entity both return `Ok`.
pub async fn delete_until_success<T, S>(
    store: &S,
    stored: Stored<T>,
) -> Result<(), StoreError<T, S::Error>>
where
    S: EntityStore<T>,
{
    let mut current = stored;
    loop {
        match store.delete(&current).await {
            Ok(()) | Err(StoreError::Deleted | StoreError::NotFound) => return Ok(()),
            Err(StoreError::Conflict { latest }) => {
                debug!(
                    identity = %latest.identity(),
                    version = %latest.version(),
                    "delete conflicted, rebasing"
                );
                current = *latest;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::memory::{MemoryBackend, MemoryBackendError};
    use crate::storage::versioned::VersionedStore;

    type CounterStore = VersionedStore<u64, MemoryBackend<u64>>;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_all_land() {
        const TASKS: u64 = 32;
        let store: Arc<CounterStore> = Arc::new(VersionedStore::new(MemoryBackend::new()));
        let initial = store.save(0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let store = Arc::clone(&store);
            let snapshot = initial.clone();
            handles.push(tokio::spawn(async move {
                update_until_success(store.as_ref(), snapshot, |v| v + 1)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let last = store.get(initial.identity()).await.unwrap();
        assert_eq!(*last.value(), TASKS);
    }

    #[tokio::test]
    async fn stale_snapshot_is_rebased() {
        let store: CounterStore = VersionedStore::new(MemoryBackend::new());
        let v0 = store.save(10).await.unwrap();
        store.update(&v0, 20).await.unwrap();

        let updated = update_until_success(&store, v0, |v| v * 2).await.unwrap();
        assert_eq!(*updated.value(), 40);
    }

    #[tokio::test]
    async fn update_of_deleted_entity_propagates() {
        let store: CounterStore = VersionedStore::new(MemoryBackend::new());
        let v0 = store.save(1).await.unwrap();
        store.delete(&v0).await.unwrap();

        let result = update_until_success(&store, v0, |v| v + 1).await;
        assert!(matches!(result, Err(StoreError::Deleted)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_deletes_both_succeed() {
        let store: Arc<CounterStore> = Arc::new(VersionedStore::new(MemoryBackend::new()));
        let v0 = store.save(1).await.unwrap();

        let first = {
            let store = Arc::clone(&store);
            let v0 = v0.clone();
            tokio::spawn(async move { delete_until_success(store.as_ref(), v0).await })
        };
        let second = {
            let store = Arc::clone(&store);
            let v0 = v0.clone();
            tokio::spawn(async move { delete_until_success(store.as_ref(), v0).await })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert!(matches!(
            store.get(v0.identity()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_rebases_past_newer_versions() {
        let store: CounterStore = VersionedStore::new(MemoryBackend::new());
        let v0 = store.save(1).await.unwrap();
        let v1 = store.update(&v0, 2).await.unwrap();
        store.update(&v1, 3).await.unwrap();

        delete_until_success(&store, v0.clone()).await.unwrap();
        assert!(store.backend().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_not_retried() {
        let store: CounterStore = VersionedStore::new(MemoryBackend::new());
        let v0 = store.save(1).await.unwrap();
        store.backend().set_unavailable(true);

        assert!(matches!(
            update_until_success(&store, v0.clone(), |v| v + 1).await,
            Err(StoreError::Backend(MemoryBackendError::Unavailable))
        ));
        assert!(matches!(
            delete_until_success(&store, v0).await,
            Err(StoreError::Backend(MemoryBackendError::Unavailable))
        ));
    }
}
