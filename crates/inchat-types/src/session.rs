//! Login sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::stored::Identity;

/// A login session, created each time a user logs in or registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The account this session authenticates.
    pub account: Identity,
    pub expiry: DateTime<Utc>,
}

impl Session {
    /// A session for `account` that expires `lifetime` from now.
    pub fn starting_now(account: Identity, lifetime: Duration) -> Self {
        Self {
            account,
            expiry: Utc::now() + lifetime,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let session = Session::starting_now(Identity::new(), Duration::hours(24));
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(Utc::now() + Duration::hours(25)));
    }
}
