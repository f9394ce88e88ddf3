//! Chat forum rules on top of the versioned stores.
//!
//! `InChat` owns one `VersionedStore` per entity kind and implements
//! registration, sessions, channels, messages and roles. The `directory`
//! traits add the name lookups the SQLite and memory backends provide.

pub mod directory;
pub mod service;
