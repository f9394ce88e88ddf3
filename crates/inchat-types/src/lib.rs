//! Shared domain types for InChat.
//!
//! This crate contains the versioned snapshot wrapper every entity is stored
//! in, the storage and chat error types, and the chat domain values:
//! User, Account, Channel, Event, Session.
//!
//! Zero infrastructure dependencies: only serde, uuid, chrono, thiserror.

pub mod account;
pub mod channel;
pub mod config;
pub mod error;
pub mod session;
pub mod stored;
pub mod user;
