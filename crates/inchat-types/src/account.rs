//! Accounts, channel memberships, and roles.
//!
//! An account holds everything private to one user: the password hash and
//! the channels the user has joined, each with a role. Like every stored
//! value, an `Account` is never mutated; the builder-style methods return
//! a new account to be committed through the store.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::stored::Identity;

/// Role of an account within one channel, ordered by privilege.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('banned', 'observer', 'participant', 'moderator', 'owner'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Banned,
    Observer,
    Participant,
    Moderator,
    Owner,
}

impl Role {
    /// Whether this role may post messages.
    pub fn can_post(self) -> bool {
        self >= Role::Participant
    }

    /// Whether this role may edit or delete other users' events.
    pub fn can_moderate(self) -> bool {
        self >= Role::Moderator
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Banned => write!(f, "banned"),
            Role::Observer => write!(f, "observer"),
            Role::Participant => write!(f, "participant"),
            Role::Moderator => write!(f, "moderator"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "banned" => Ok(Role::Banned),
            "observer" => Ok(Role::Observer),
            "participant" => Ok(Role::Participant),
            "moderator" => Ok(Role::Moderator),
            "owner" => Ok(Role::Owner),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// One joined channel: local alias, channel identity, and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub alias: String,
    pub channel: Identity,
    pub role: Role,
}

/// Private account data for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identity of the public `User` profile.
    pub user: Identity,
    /// Login name, duplicated from the user profile for lookups.
    pub username: String,
    /// Encoded password hash (PHC string).
    pub password_hash: String,
    /// Joined channels in join order.
    pub memberships: Vec<Membership>,
}

impl Account {
    pub fn new(user: Identity, username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            user,
            username: username.into(),
            password_hash: password_hash.into(),
            memberships: Vec::new(),
        }
    }

    /// Join a channel, or refresh alias and role if already a member.
    pub fn join_channel(&self, alias: impl Into<String>, channel: Identity, role: Role) -> Self {
        let alias = alias.into();
        let mut memberships = self.memberships.clone();
        match memberships.iter_mut().find(|m| m.channel == channel) {
            Some(existing) => {
                existing.alias = alias;
                existing.role = role;
            }
            None => memberships.push(Membership {
                alias,
                channel,
                role,
            }),
        }
        Self {
            memberships,
            ..self.clone()
        }
    }

    /// Change the role held in `channel`. Non-members are left untouched.
    pub fn set_role(&self, channel: Identity, role: Role) -> Self {
        let memberships = self
            .memberships
            .iter()
            .map(|m| {
                if m.channel == channel {
                    Membership { role, ..m.clone() }
                } else {
                    m.clone()
                }
            })
            .collect();
        Self {
            memberships,
            ..self.clone()
        }
    }

    pub fn membership(&self, channel: Identity) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.channel == channel)
    }

    pub fn role_in(&self, channel: Identity) -> Option<Role> {
        self.membership(channel).map(|m| m.role)
    }
}
