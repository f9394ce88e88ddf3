//! Password hashing port and the password acceptance policy.
//!
//! The `Argon2PasswordHasher` adapter lives in inchat-infra.

use thiserror::Error;

/// Errors from a [`PasswordHasher`].
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailed(String),
}

/// Abstraction over one-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash `password` into a self-describing string (salt included).
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Check `password` against a hash produced by [`hash`](Self::hash).
    /// Malformed hashes verify as `false`.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Frequently leaked passwords that are refused regardless of length.
const COMMON_PASSWORDS: &[&str] = &[
    "123456789",
    "1234567890",
    "12345678910",
    "987654321",
    "0987654321",
    "111111111",
    "1111111111",
    "123123123",
    "qwertyuiop",
    "qwerty123",
    "qwerty1234",
    "1q2w3e4r5t",
    "1qaz2wsx3edc",
    "asdfghjkl",
    "zxcvbnm123",
    "password1",
    "password12",
    "password123",
    "passw0rd1",
    "iloveyou1",
    "iloveyou2",
    "sunshine1",
    "princess1",
    "football1",
    "baseball1",
    "superman1",
    "starwars1",
    "trustno1!",
    "letmein123",
    "welcome123",
    "monkey123",
    "dragon123",
    "abc123456",
    "abcd12345",
    "abcdefghi",
    "changeme1",
    "administrator",
    "1234qwerasdf",
    "computer1",
    "michael123",
];

/// Rules a new password must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
}

impl PasswordPolicy {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Check `password`, returning a human-readable reason on rejection.
    pub fn check(&self, password: &str) -> Result<(), String> {
        if password.is_empty() {
            return Err("password must not be empty".to_string());
        }
        if password.chars().count() < self.min_length {
            return Err(format!(
                "password must be at least {} characters",
                self.min_length
            ));
        }
        if COMMON_PASSWORDS
            .iter()
            .any(|common| common.eq_ignore_ascii_case(password))
        {
            return Err("password is too common".to_string());
        }
        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(9)
    }
}
