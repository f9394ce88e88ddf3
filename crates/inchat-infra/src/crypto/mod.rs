//! Cryptographic operations for InChat.
//!
//! - `password`: Argon2id password hashing

pub mod password;
