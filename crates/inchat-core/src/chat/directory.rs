//! Lookup queries the chat service needs beyond fetch-by-identity.
//!
//! Each directory extends the entity's [`Backend`], so one backend value
//! serves both the versioned store and the lookups, with one error type.

use std::future::Future;

use inchat_types::account::{Account, Role};
use inchat_types::channel::Channel;
use inchat_types::stored::{Identity, Stored};
use serde::{Deserialize, Serialize};

use crate::storage::Backend;
use crate::storage::memory::{MemoryBackend, MemoryBackendError};

/// A channel's identity and name, without its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub identity: Identity,
    pub name: String,
}

/// Account lookups by username and role.
pub trait AccountDirectory: Backend<Account> {
    /// The account registered under `username`, if any.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<Stored<Account>>, Self::Error>> + Send;

    /// How many accounts hold exactly `role` in `channel`.
    fn count_with_role(
        &self,
        channel: Identity,
        role: Role,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}

/// Channel lookups by name, and the channel listing.
pub trait ChannelDirectory: Backend<Channel> {
    /// The channel called `name`, if any.
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Stored<Channel>>, Self::Error>> + Send;

    /// Every live channel, oldest first.
    fn list_channels(
        &self,
    ) -> impl Future<Output = Result<Vec<ChannelSummary>, Self::Error>> + Send;
}

impl AccountDirectory for MemoryBackend<Account> {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Stored<Account>>, MemoryBackendError> {
        self.check_available()?;
        Ok(self
            .find(|account| account.username == username)
            .into_iter()
            .next())
    }

    async fn count_with_role(
        &self,
        channel: Identity,
        role: Role,
    ) -> Result<usize, MemoryBackendError> {
        self.check_available()?;
        Ok(self
            .find(|account| account.role_in(channel) == Some(role))
            .len())
    }
}

impl ChannelDirectory for MemoryBackend<Channel> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Stored<Channel>>, MemoryBackendError> {
        self.check_available()?;
        Ok(self.find(|channel| channel.name == name).into_iter().next())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, MemoryBackendError> {
        self.check_available()?;
        Ok(self
            .snapshots()
            .into_iter()
            .map(|stored| ChannelSummary {
                identity: stored.identity(),
                name: stored.value().name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_account_by_username() {
        let backend = MemoryBackend::new();
        let alice = Stored::new(Account::new(Identity::new(), "alice", "h"));
        let bob = Stored::new(Account::new(Identity::new(), "bob", "h"));
        backend.persist_new(&alice).await.unwrap();
        backend.persist_new(&bob).await.unwrap();

        assert_eq!(backend.find_by_username("bob").await.unwrap(), Some(bob));
        assert_eq!(backend.find_by_username("carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_with_role() {
        let backend = MemoryBackend::new();
        let channel = Identity::new();
        let owner = Account::new(Identity::new(), "alice", "h").join_channel("general", channel, Role::Owner);
        let member = Account::new(Identity::new(), "bob", "h").join_channel("general", channel, Role::Participant);
        backend.persist_new(&Stored::new(owner)).await.unwrap();
        backend.persist_new(&Stored::new(member)).await.unwrap();

        assert_eq!(backend.count_with_role(channel, Role::Owner).await.unwrap(), 1);
        assert_eq!(backend.count_with_role(channel, Role::Moderator).await.unwrap(), 0);
        assert_eq!(
            backend.count_with_role(Identity::new(), Role::Owner).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_list_channels_in_creation_order() {
        let backend = MemoryBackend::new();
        let first = Stored::new(Channel::new("general"));
        let second = Stored::new(Channel::new("random"));
        backend.persist_new(&first).await.unwrap();
        backend.persist_new(&second).await.unwrap();

        let names: Vec<String> = backend
            .list_channels()
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        assert_eq!(names, vec!["general", "random"]);
        assert_eq!(
            backend.find_by_name("random").await.unwrap().map(|c| c.identity()),
            Some(second.identity())
        );
    }

    #[tokio::test]
    async fn test_unavailable_directory_fails() {
        let backend: MemoryBackend<Channel> = MemoryBackend::new();
        backend.set_unavailable(true);
        assert!(matches!(
            backend.list_channels().await,
            Err(MemoryBackendError::Unavailable)
        ));
    }
}
