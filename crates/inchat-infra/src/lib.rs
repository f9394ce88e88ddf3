//! Infrastructure layer for InChat.
//!
//! Contains implementations of the ports defined in `inchat-core`: SQLite
//! entity backends, Argon2id password hashing, and the `config.toml`
//! loader.

pub mod config;
pub mod crypto;
pub mod sqlite;
