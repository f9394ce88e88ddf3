use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public profile of a chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub joined: DateTime<Utc>,
}

impl User {
    /// A user who joins now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joined: Utc::now(),
        }
    }
}
