//! Versioned snapshots of stored entities.
//!
//! Every value persisted by InChat is wrapped in a [`Stored`] snapshot: a
//! stable [`Identity`] naming the entity across its whole history, a
//! [`Version`] naming one committed state, and the immutable value itself.
//! Updating an entity never mutates a snapshot; it produces a new one with
//! the same identity and a fresh version.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Stable identity of a stored entity. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub Uuid);

impl Identity {
    /// Allocate a fresh identity (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID, e.g. one read back from a database row.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Token naming one committed state of an entity.
///
/// A new version is allocated on every successful mutation, so two
/// snapshots with the same identity and version always carry the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub Uuid);

impl Version {
    /// Allocate a fresh, never-before-seen version.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An immutable `(identity, version, value)` snapshot.
///
/// Fields are private: the payload is only reachable through a shared
/// reference, so a delivered snapshot can never be changed in place.
/// Equality is structural over all three components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    identity: Identity,
    version: Version,
    value: T,
}

impl<T> Stored<T> {
    /// Wrap a brand-new value, allocating its identity and initial version.
    pub fn new(value: T) -> Self {
        Self {
            identity: Identity::new(),
            version: Version::new(),
            value,
        }
    }

    /// Recreate a snapshot from its persisted parts.
    pub fn from_parts(identity: Identity, version: Version, value: T) -> Self {
        Self {
            identity,
            version,
            value,
        }
    }

    /// The next snapshot of the same entity: same identity, fresh version.
    pub fn new_version(&self, value: T) -> Self {
        Self {
            identity: self.identity,
            version: Version::new(),
            value,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the snapshot, keeping only the payload.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Transform the payload while keeping identity and version.
    ///
    /// Used by backends when converting row types into domain values.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stored<U> {
        Stored {
            identity: self.identity,
            version: self.version,
            value: f(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_version_keeps_identity_and_changes_version() {
        let first = Stored::new(1u32);
        let second = first.new_version(2);
        assert_eq!(first.identity(), second.identity());
        assert_ne!(first.version(), second.version());
        assert_eq!(*second.value(), 2);
    }

    #[test]
    fn repeated_value_still_gets_distinct_version() {
        let first = Stored::new("same".to_string());
        let second = first.new_version("same".to_string());
        assert_ne!(first, second);
        assert_eq!(first.value(), second.value());
    }

    #[test]
    fn equality_is_structural() {
        let a = Stored::new(7u8);
        let b = Stored::from_parts(a.identity(), a.version(), 7u8);
        let c = Stored::from_parts(a.identity(), a.version(), 8u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fresh_snapshots_have_distinct_identities() {
        let a = Stored::new(());
        let b = Stored::new(());
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn identity_parses_from_display() {
        let id = Identity::new();
        let parsed: Identity = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<Identity>().is_err());
    }

    #[test]
    fn map_preserves_identity_and_version() {
        let stored = Stored::new(21u32);
        let doubled = stored.clone().map(|v| v * 2);
        assert_eq!(doubled.identity(), stored.identity());
        assert_eq!(doubled.version(), stored.version());
        assert_eq!(*doubled.value(), 42);
    }

    #[test]
    fn serializes_identity_transparently() {
        let stored = Stored::new(5u8);
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["identity"], stored.identity().to_string());
        assert_eq!(json["value"], 5);
    }
}
