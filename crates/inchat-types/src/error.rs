use std::fmt;

use thiserror::Error;

use crate::stored::Stored;

/// Outcome of a failed store operation.
///
/// `Conflict` and `Deleted` are ordinary results of contention, not rare
/// failures: every caller of `update`/`delete` handles them, either directly
/// or through the retry helpers. `Backend` carries the persistence layer's
/// own error untouched.
#[derive(Debug, Error)]
pub enum StoreError<T, E> {
    /// The expected version was stale. Carries the authoritative snapshot.
    #[error("entity {} was updated concurrently (latest version {})", .latest.identity(), .latest.version())]
    Conflict { latest: Box<Stored<T>> },

    /// The entity was deleted; terminal for this identity.
    #[error("entity was deleted")]
    Deleted,

    /// The identity never existed or no longer resolves.
    #[error("entity not found")]
    NotFound,

    /// The persistence backend failed.
    #[error("backend failure: {0}")]
    Backend(E),
}

impl<T, E> StoreError<T, E> {
    /// Build a conflict carrying the authoritative snapshot.
    pub fn conflict(latest: Stored<T>) -> Self {
        StoreError::Conflict {
            latest: Box::new(latest),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// True for `Deleted` and `NotFound`: the identity no longer resolves.
    pub fn is_gone(&self) -> bool {
        matches!(self, StoreError::Deleted | StoreError::NotFound)
    }
}

/// Errors surfaced by the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("password rejected: {0}")]
    PasswordRejected(String),

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("channel '{0}' already exists")]
    ChannelExists(String),

    #[error("invalid channel name: {0}")]
    InvalidChannelName(String),

    #[error("not found")]
    NotFound,

    #[error("this no longer exists")]
    Deleted,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("session expired")]
    SessionExpired,

    #[error("cannot remove the last owner of channel '{0}'")]
    LastOwner(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl<T, E: fmt::Display> From<StoreError<T, E>> for ChatError {
    fn from(err: StoreError<T, E>) -> Self {
        match err {
            StoreError::Deleted => ChatError::Deleted,
            StoreError::NotFound => ChatError::NotFound,
            StoreError::Conflict { latest } => ChatError::Storage(format!(
                "unresolved conflict on {}",
                latest.identity()
            )),
            StoreError::Backend(e) => ChatError::Storage(e.to_string()),
        }
    }
}
