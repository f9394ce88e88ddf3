//! Storage ports, the versioned entity store, and chat logic for InChat.
//!
//! `storage` holds the optimistic-concurrency store every entity goes
//! through: the `Backend` port that infrastructure implements, the
//! `EntityStore` contract, retry helpers, and the waiter registry behind
//! blocking wait-for-next-version. `chat` builds the forum rules on top.
//! This crate depends only on `inchat-types`, never on `inchat-infra` or
//! any database crate.

pub mod chat;
pub mod service;
pub mod storage;
