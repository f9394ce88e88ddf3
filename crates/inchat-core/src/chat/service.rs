//! Chat service: accounts, sessions, channels, messages and roles.
//!
//! `InChat` is generic over the five entity backends and the password
//! hasher, so inchat-core never depends on inchat-infra. Every mutation
//! goes through a `VersionedStore`; edits to a channel's events rebase the
//! channel with `update_until_success`, which also wakes anyone following
//! the channel.

use std::time::Duration;

use chrono::Utc;
use inchat_types::account::{Account, Role};
use inchat_types::channel::{Channel, Event, EventKind};
use inchat_types::config::InchatConfig;
use inchat_types::error::{ChatError, StoreError};
use inchat_types::session::Session;
use inchat_types::stored::{Identity, Stored, Version};
use inchat_types::user::User;
use tracing::{debug, info, warn};

use crate::chat::directory::{AccountDirectory, ChannelDirectory, ChannelSummary};
use crate::service::password::{PasswordHasher, PasswordPolicy};
use crate::storage::retry::{delete_until_success, update_until_success};
use crate::storage::versioned::VersionedStore;
use crate::storage::{Backend, EntityStore};

const MAX_USERNAME_LENGTH: usize = 32;
const MAX_CHANNEL_NAME_LENGTH: usize = 64;

/// Tunables for [`InChat`], usually derived from [`InchatConfig`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub session_lifetime: chrono::Duration,
    pub password_policy: PasswordPolicy,
    /// Default long-poll timeout for following a channel.
    pub wait_timeout: Duration,
}

impl ChatSettings {
    pub fn from_config(config: &InchatConfig) -> Self {
        let lifetime_secs = i64::try_from(config.session_lifetime_secs).unwrap_or(i64::MAX);
        Self {
            session_lifetime: chrono::Duration::try_seconds(lifetime_secs)
                .unwrap_or(chrono::Duration::MAX),
            password_policy: PasswordPolicy::new(config.min_password_length),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&InchatConfig::default())
    }
}

fn storage_error(err: impl std::fmt::Display) -> ChatError {
    ChatError::Storage(err.to_string())
}

fn validate_username(username: &str) -> Result<(), ChatError> {
    if username.is_empty() {
        return Err(ChatError::InvalidUsername("must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ChatError::InvalidUsername(format!(
            "must be at most {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ChatError::InvalidUsername(
            "only letters, digits, '.', '_' and '-' are allowed".to_string(),
        ));
    }
    Ok(())
}

fn validate_channel_name(name: &str) -> Result<(), ChatError> {
    if name.trim().is_empty() {
        return Err(ChatError::InvalidChannelName("must not be empty".to_string()));
    }
    if name.chars().count() > MAX_CHANNEL_NAME_LENGTH {
        return Err(ChatError::InvalidChannelName(format!(
            "must be at most {MAX_CHANNEL_NAME_LENGTH} characters"
        )));
    }
    if name.trim() != name || name.chars().any(char::is_control) {
        return Err(ChatError::InvalidChannelName(
            "no leading/trailing whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

/// The chat forum.
pub struct InChat<U, A, C, E, S, H>
where
    U: Backend<User>,
    A: AccountDirectory,
    C: ChannelDirectory,
    E: Backend<Event>,
    S: Backend<Session>,
    H: PasswordHasher,
{
    users: VersionedStore<User, U>,
    accounts: VersionedStore<Account, A>,
    channels: VersionedStore<Channel, C>,
    events: VersionedStore<Event, E>,
    sessions: VersionedStore<Session, S>,
    hasher: H,
    settings: ChatSettings,
}

impl<U, A, C, E, S, H> InChat<U, A, C, E, S, H>
where
    U: Backend<User>,
    A: AccountDirectory,
    C: ChannelDirectory,
    E: Backend<Event>,
    S: Backend<Session>,
    H: PasswordHasher,
{
    pub fn new(
        users: U,
        accounts: A,
        channels: C,
        events: E,
        sessions: S,
        hasher: H,
        settings: ChatSettings,
    ) -> Self {
        Self {
            users: VersionedStore::new(users),
            accounts: VersionedStore::new(accounts),
            channels: VersionedStore::new(channels),
            events: VersionedStore::new(events),
            sessions: VersionedStore::new(sessions),
            hasher,
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// The channel store, for callers that follow channels directly.
    pub fn channels(&self) -> &VersionedStore<Channel, C> {
        &self.channels
    }

    // --- Accounts and sessions ---

    /// Register a new user and log them in.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        password_repeat: &str,
    ) -> Result<Stored<Session>, ChatError> {
        validate_username(username)?;
        if password != password_repeat {
            return Err(ChatError::PasswordRejected(
                "passwords do not match".to_string(),
            ));
        }
        self.settings
            .password_policy
            .check(password)
            .map_err(ChatError::PasswordRejected)?;

        let existing = self
            .accounts
            .backend()
            .find_by_username(username)
            .await
            .map_err(storage_error)?;
        if existing.is_some() {
            return Err(ChatError::UsernameTaken(username.to_string()));
        }

        let hash = self
            .hasher
            .hash(password)
            .map_err(|e| ChatError::Hashing(e.to_string()))?;
        let user = self.users.save(User::new(username)).await?;
        let account = self
            .accounts
            .save(Account::new(user.identity(), username, hash))
            .await?;
        let session = self.start_session(account.identity()).await?;

        info!(username, account = %account.identity(), "registered user");
        Ok(session)
    }

    /// Check credentials and open a new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Stored<Session>, ChatError> {
        let account = self
            .accounts
            .backend()
            .find_by_username(username)
            .await
            .map_err(storage_error)?;
        let Some(account) = account else {
            debug!(username, "login for unknown user");
            return Err(ChatError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &account.value().password_hash) {
            warn!(username, "login with wrong password");
            return Err(ChatError::InvalidCredentials);
        }

        let session = self.start_session(account.identity()).await?;
        info!(username, session = %session.identity(), "logged in");
        Ok(session)
    }

    async fn start_session(&self, account: Identity) -> Result<Stored<Session>, ChatError> {
        let session = Session::starting_now(account, self.settings.session_lifetime);
        Ok(self.sessions.save(session).await?)
    }

    /// Look up a session by id. Expired sessions are deleted and rejected.
    pub async fn restore_session(&self, id: Identity) -> Result<Stored<Session>, ChatError> {
        let session = self.sessions.get(id).await?;
        if session.value().is_expired_at(Utc::now()) {
            debug!(session = %id, "session expired, removing");
            delete_until_success(&self.sessions, session).await?;
            return Err(ChatError::SessionExpired);
        }
        Ok(session)
    }

    /// End a session. Already-ended sessions are fine.
    pub async fn logout(&self, session: Stored<Session>) -> Result<(), ChatError> {
        let id = session.identity();
        delete_until_success(&self.sessions, session).await?;
        info!(session = %id, "logged out");
        Ok(())
    }

    /// The account a session belongs to.
    pub async fn session_account(
        &self,
        session: &Stored<Session>,
    ) -> Result<Stored<Account>, ChatError> {
        self.account(session.value().account).await
    }

    pub async fn account(&self, id: Identity) -> Result<Stored<Account>, ChatError> {
        Ok(self.accounts.get(id).await?)
    }

    pub async fn user(&self, id: Identity) -> Result<Stored<User>, ChatError> {
        Ok(self.users.get(id).await?)
    }

    // --- Channels ---

    /// Create a channel; the creator joins it as `Owner`.
    pub async fn create_channel(
        &self,
        account: Identity,
        name: &str,
    ) -> Result<Stored<Channel>, ChatError> {
        validate_channel_name(name)?;
        let existing = self
            .channels
            .backend()
            .find_by_name(name)
            .await
            .map_err(storage_error)?;
        if existing.is_some() {
            return Err(ChatError::ChannelExists(name.to_string()));
        }

        let account = self.accounts.get(account).await?;
        let channel = self.channels.save(Channel::new(name)).await?;
        info!(channel = %channel.identity(), name, "created channel");
        self.enter_channel(account, channel, Role::Owner).await
    }

    /// Join a channel as `Participant`.
    ///
    /// Existing members keep their role and the channel is returned
    /// unchanged.
    pub async fn join_channel(
        &self,
        account: Identity,
        channel: Identity,
    ) -> Result<Stored<Channel>, ChatError> {
        let account = self.accounts.get(account).await?;
        let channel = self.channels.get(channel).await?;
        if let Some(role) = account.value().role_in(channel.identity()) {
            debug!(
                username = %account.value().username,
                channel = %channel.identity(),
                %role,
                "already a member"
            );
            return Ok(channel);
        }
        self.enter_channel(account, channel, Role::Participant).await
    }

    async fn enter_channel(
        &self,
        account: Stored<Account>,
        channel: Stored<Channel>,
        role: Role,
    ) -> Result<Stored<Channel>, ChatError> {
        let channel_id = channel.identity();
        let alias = channel.value().name.clone();
        let account = update_until_success(&self.accounts, account, |a| {
            a.join_channel(alias.as_str(), channel_id, role)
        })
        .await?;

        let join = Event::join(channel_id, Utc::now(), account.value().username.as_str());
        let channel = self.append_event(channel, join).await?;
        info!(username = %account.value().username, channel = %channel_id, %role, "joined channel");
        Ok(channel)
    }

    /// Persist `event` and append it to `channel`. If the channel vanished
    /// meanwhile the event is removed again.
    async fn append_event(
        &self,
        channel: Stored<Channel>,
        event: Event,
    ) -> Result<Stored<Channel>, ChatError> {
        let event = self.events.save(event).await?;
        match update_until_success(&self.channels, channel, |c| c.post_event(event.clone())).await {
            Ok(channel) => Ok(channel),
            Err(StoreError::Deleted) => {
                debug!(event = %event.identity(), "channel deleted while posting");
                delete_until_success(&self.events, event).await?;
                Err(ChatError::Deleted)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_channel(&self, id: Identity) -> Result<Stored<Channel>, ChatError> {
        Ok(self.channels.get(id).await?)
    }

    /// Resolve a channel by name.
    pub async fn find_channel(&self, name: &str) -> Result<Stored<Channel>, ChatError> {
        self.channels
            .backend()
            .find_by_name(name)
            .await
            .map_err(storage_error)?
            .ok_or(ChatError::NotFound)
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelSummary>, ChatError> {
        self.channels
            .backend()
            .list_channels()
            .await
            .map_err(storage_error)
    }

    /// Block until `channel` moves past `version`, for at most `timeout`.
    ///
    /// `Ok(None)` means nothing changed in time.
    pub async fn wait_next_channel_version(
        &self,
        channel: Identity,
        version: Version,
        timeout: Duration,
    ) -> Result<Option<Stored<Channel>>, ChatError> {
        Ok(self
            .channels
            .wait_next_version_timeout(channel, version, timeout)
            .await?)
    }

    // --- Messages ---

    /// Post a message. Requires `Participant` or higher in the channel.
    pub async fn post_message(
        &self,
        account: Identity,
        channel: Identity,
        text: &str,
    ) -> Result<Stored<Channel>, ChatError> {
        let account = self.accounts.get(account).await?;
        let channel = self.channels.get(channel).await?;
        let role = self.member_role(&account, &channel)?;
        if !role.can_post() {
            return Err(ChatError::PermissionDenied(format!(
                "a {role} cannot post in '{}'",
                channel.value().name
            )));
        }

        let username = account.value().username.as_str();
        let message = Event::message(channel.identity(), Utc::now(), username, text);
        let channel = self.append_event(channel, message).await?;
        debug!(username, channel = %channel.identity(), "posted message");
        Ok(channel)
    }

    pub async fn get_event(&self, id: Identity) -> Result<Stored<Event>, ChatError> {
        Ok(self.events.get(id).await?)
    }

    /// Replace a message's text. Moderators may edit any message; senders
    /// with `Participant` or higher may edit their own.
    pub async fn edit_message(
        &self,
        account: Identity,
        channel: Identity,
        event: Identity,
        text: &str,
    ) -> Result<Stored<Channel>, ChatError> {
        let (channel, event) = self.authorize_event_change(account, channel, event).await?;
        if event.value().kind != EventKind::Message {
            return Err(ChatError::PermissionDenied(
                "only messages can be edited".to_string(),
            ));
        }

        let edited = update_until_success(&self.events, event, |e| e.with_message(text)).await?;
        let channel = update_until_success(&self.channels, channel, |c| {
            c.replace_event(edited.clone())
        })
        .await?;
        debug!(event = %edited.identity(), channel = %channel.identity(), "edited message");
        Ok(channel)
    }

    /// Remove an event, with the same permissions as editing.
    pub async fn delete_event(
        &self,
        account: Identity,
        channel: Identity,
        event: Identity,
    ) -> Result<Stored<Channel>, ChatError> {
        let (channel, event) = self.authorize_event_change(account, channel, event).await?;
        let event_id = event.identity();

        delete_until_success(&self.events, event).await?;
        let channel =
            update_until_success(&self.channels, channel, |c| c.remove_event(event_id)).await?;
        debug!(event = %event_id, channel = %channel.identity(), "deleted event");
        Ok(channel)
    }

    async fn authorize_event_change(
        &self,
        account: Identity,
        channel: Identity,
        event: Identity,
    ) -> Result<(Stored<Channel>, Stored<Event>), ChatError> {
        let account = self.accounts.get(account).await?;
        let channel = self.channels.get(channel).await?;
        let event = self.events.get(event).await?;
        if event.value().channel != channel.identity() {
            return Err(ChatError::NotFound);
        }

        let role = self.member_role(&account, &channel)?;
        let own = event.value().sender == account.value().username;
        if role.can_moderate() || (own && role.can_post()) {
            Ok((channel, event))
        } else {
            Err(ChatError::PermissionDenied(format!(
                "a {role} cannot change this event"
            )))
        }
    }

    fn member_role(
        &self,
        account: &Stored<Account>,
        channel: &Stored<Channel>,
    ) -> Result<Role, ChatError> {
        account.value().role_in(channel.identity()).ok_or_else(|| {
            ChatError::PermissionDenied(format!(
                "not a member of '{}'",
                channel.value().name
            ))
        })
    }

    // --- Roles ---

    /// Give `username` a new role in `channel`. Only owners may do this,
    /// and the last owner cannot demote themself.
    pub async fn set_role(
        &self,
        account: Identity,
        channel: Identity,
        username: &str,
        role: Role,
    ) -> Result<Stored<Account>, ChatError> {
        let actor = self.accounts.get(account).await?;
        let channel = self.channels.get(channel).await?;
        let channel_id = channel.identity();
        let name = channel.value().name.as_str();
        if actor.value().role_in(channel_id) != Some(Role::Owner) {
            return Err(ChatError::PermissionDenied(format!(
                "only owners can change roles in '{name}'"
            )));
        }

        let target = self
            .accounts
            .backend()
            .find_by_username(username)
            .await
            .map_err(storage_error)?
            .ok_or(ChatError::NotFound)?;
        if target.value().role_in(channel_id).is_none() {
            return Err(ChatError::NotFound);
        }

        if target.identity() == actor.identity() && role != Role::Owner {
            let owners = self
                .accounts
                .backend()
                .count_with_role(channel_id, Role::Owner)
                .await
                .map_err(storage_error)?;
            if owners <= 1 {
                return Err(ChatError::LastOwner(name.to_string()));
            }
        }

        let updated =
            update_until_success(&self.accounts, target, |a| a.set_role(channel_id, role)).await?;
        info!(username, channel = %channel_id, %role, "changed role");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::password::PasswordError;
    use crate::storage::memory::MemoryBackend;

    /// Reversible stand-in for a real hash.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, PasswordError> {
            Ok(format!("plain${password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash.strip_prefix("plain$") == Some(password)
        }
    }

    type TestChat = InChat<
        MemoryBackend<User>,
        MemoryBackend<Account>,
        MemoryBackend<Channel>,
        MemoryBackend<Event>,
        MemoryBackend<Session>,
        PlainHasher,
    >;

    const PASSWORD: &str = "correct horse battery";

    fn chat_with(settings: ChatSettings) -> TestChat {
        InChat::new(
            MemoryBackend::new(),
            MemoryBackend::new(),
            MemoryBackend::new(),
            MemoryBackend::new(),
            MemoryBackend::new(),
            PlainHasher,
            settings,
        )
    }

    fn chat() -> TestChat {
        chat_with(ChatSettings::default())
    }

    async fn register(chat: &TestChat, username: &str) -> Identity {
        let session = chat.register(username, PASSWORD, PASSWORD).await.unwrap();
        session.value().account
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let chat = chat();
        let session = chat.register("alice", PASSWORD, PASSWORD).await.unwrap();
        let account = chat.session_account(&session).await.unwrap();
        assert_eq!(account.value().username, "alice");
        let user = chat.user(account.value().user).await.unwrap();
        assert_eq!(user.value().name, "alice");

        let login = chat.login("alice", PASSWORD).await.unwrap();
        assert_ne!(login.identity(), session.identity());
        assert_eq!(login.value().account, account.identity());
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let chat = chat();
        assert!(matches!(
            chat.register("alice", PASSWORD, "something else").await,
            Err(ChatError::PasswordRejected(_))
        ));
        assert!(matches!(
            chat.register("alice", "short", "short").await,
            Err(ChatError::PasswordRejected(_))
        ));
        assert!(matches!(
            chat.register("", PASSWORD, PASSWORD).await,
            Err(ChatError::InvalidUsername(_))
        ));
        assert!(matches!(
            chat.register("al ice", PASSWORD, PASSWORD).await,
            Err(ChatError::InvalidUsername(_))
        ));

        register(&chat, "alice").await;
        assert!(matches!(
            chat.register("alice", PASSWORD, PASSWORD).await,
            Err(ChatError::UsernameTaken(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let chat = chat();
        register(&chat, "alice").await;
        let wrong_password = chat.login("alice", "not the password").await.unwrap_err();
        let unknown_user = chat.login("bob", PASSWORD).await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, ChatError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_restore_and_logout() {
        let chat = chat();
        let session = chat.register("alice", PASSWORD, PASSWORD).await.unwrap();
        let restored = chat.restore_session(session.identity()).await.unwrap();
        assert_eq!(restored, session);

        chat.logout(restored).await.unwrap();
        assert!(matches!(
            chat.restore_session(session.identity()).await,
            Err(ChatError::NotFound)
        ));
        // Logging out twice is harmless.
        chat.logout(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let chat = chat_with(ChatSettings {
            session_lifetime: chrono::Duration::seconds(-1),
            ..ChatSettings::default()
        });
        let session = chat.register("alice", PASSWORD, PASSWORD).await.unwrap();
        assert!(matches!(
            chat.restore_session(session.identity()).await,
            Err(ChatError::SessionExpired)
        ));
        assert!(matches!(
            chat.restore_session(session.identity()).await,
            Err(ChatError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_channel_makes_creator_owner() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();

        assert_eq!(channel.value().name, "general");
        assert_eq!(channel.value().events.len(), 1);
        assert_eq!(channel.value().events[0].value().kind, EventKind::Join);
        let account = chat.account(alice).await.unwrap();
        assert_eq!(account.value().role_in(channel.identity()), Some(Role::Owner));

        assert!(matches!(
            chat.create_channel(alice, "general").await,
            Err(ChatError::ChannelExists(_))
        ));
        assert!(matches!(
            chat.create_channel(alice, "  ").await,
            Err(ChatError::InvalidChannelName(_))
        ));
        let listed = chat.list_channels().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identity, channel.identity());
        assert_eq!(chat.find_channel("general").await.unwrap().identity(), channel.identity());
    }

    #[tokio::test]
    async fn test_join_keeps_existing_role() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let bob = register(&chat, "bob").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();

        let joined = chat.join_channel(bob, channel.identity()).await.unwrap();
        assert_eq!(joined.value().events.len(), 2);
        let bob_account = chat.account(bob).await.unwrap();
        assert_eq!(bob_account.value().role_in(channel.identity()), Some(Role::Participant));

        // Owner re-joining is a no-op.
        let again = chat.join_channel(alice, channel.identity()).await.unwrap();
        assert_eq!(again.version(), joined.version());
        let alice_account = chat.account(alice).await.unwrap();
        assert_eq!(alice_account.value().role_in(channel.identity()), Some(Role::Owner));
    }

    #[tokio::test]
    async fn test_post_requires_membership_and_role() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let bob = register(&chat, "bob").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();
        let id = channel.identity();

        assert!(matches!(
            chat.post_message(bob, id, "hi").await,
            Err(ChatError::PermissionDenied(_))
        ));

        chat.join_channel(bob, id).await.unwrap();
        let posted = chat.post_message(bob, id, "hi").await.unwrap();
        let last = posted.value().events.last().unwrap();
        assert_eq!(last.value().message.as_deref(), Some("hi"));
        assert_eq!(chat.get_event(last.identity()).await.unwrap(), *last);

        chat.set_role(alice, id, "bob", Role::Observer).await.unwrap();
        assert!(matches!(
            chat.post_message(bob, id, "still here?").await,
            Err(ChatError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_and_delete_permissions() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let bob = register(&chat, "bob").await;
        let carol = register(&chat, "carol").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();
        let id = channel.identity();
        chat.join_channel(bob, id).await.unwrap();
        chat.join_channel(carol, id).await.unwrap();

        let posted = chat.post_message(bob, id, "typo").await.unwrap();
        let message = posted.value().events.last().unwrap().identity();

        // Another participant may not touch bob's message.
        assert!(matches!(
            chat.edit_message(carol, id, message, "vandalised").await,
            Err(ChatError::PermissionDenied(_))
        ));

        let edited = chat.edit_message(bob, id, message, "fixed").await.unwrap();
        assert_eq!(
            edited.value().event(message).unwrap().value().message.as_deref(),
            Some("fixed")
        );
        assert_ne!(edited.version(), posted.version());

        // The owner moderates.
        let cleaned = chat.delete_event(alice, id, message).await.unwrap();
        assert!(cleaned.value().event(message).is_none());
        assert!(matches!(chat.get_event(message).await, Err(ChatError::NotFound)));
    }

    #[tokio::test]
    async fn test_join_events_cannot_be_edited() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();
        let join = channel.value().events[0].identity();
        assert!(matches!(
            chat.edit_message(alice, channel.identity(), join, "text").await,
            Err(ChatError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_event_from_other_channel_is_not_found() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let general = chat.create_channel(alice, "general").await.unwrap();
        let random = chat.create_channel(alice, "random").await.unwrap();
        let posted = chat.post_message(alice, general.identity(), "hi").await.unwrap();
        let message = posted.value().events.last().unwrap().identity();

        assert!(matches!(
            chat.delete_event(alice, random.identity(), message).await,
            Err(ChatError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_set_role_rules() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let bob = register(&chat, "bob").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();
        let id = channel.identity();

        assert!(matches!(
            chat.set_role(alice, id, "bob", Role::Moderator).await,
            Err(ChatError::NotFound)
        ));
        chat.join_channel(bob, id).await.unwrap();
        assert!(matches!(
            chat.set_role(bob, id, "alice", Role::Banned).await,
            Err(ChatError::PermissionDenied(_))
        ));
        assert!(matches!(
            chat.set_role(alice, id, "alice", Role::Participant).await,
            Err(ChatError::LastOwner(_))
        ));

        let promoted = chat.set_role(alice, id, "bob", Role::Owner).await.unwrap();
        assert_eq!(promoted.value().role_in(id), Some(Role::Owner));
        // With a second owner, alice may step down.
        let stepped_down = chat.set_role(alice, id, "alice", Role::Moderator).await.unwrap();
        assert_eq!(stepped_down.value().role_in(id), Some(Role::Moderator));
    }

    #[tokio::test]
    async fn test_wait_next_channel_version_times_out() {
        let chat = chat();
        let alice = register(&chat, "alice").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();
        let next = chat
            .wait_next_channel_version(channel.identity(), channel.version(), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(next.is_none());
        assert!(chat.channels().waiters().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_follower_sees_posted_message() {
        let chat = Arc::new(chat());
        let alice = register(&chat, "alice").await;
        let channel = chat.create_channel(alice, "general").await.unwrap();

        let follower = {
            let chat = Arc::clone(&chat);
            let (id, version) = (channel.identity(), channel.version());
            tokio::spawn(async move {
                chat.wait_next_channel_version(id, version, Duration::from_secs(5))
                    .await
            })
        };
        while chat.channels().waiters().pending_waiters(channel.identity()) == 0 {
            tokio::task::yield_now().await;
        }

        chat.post_message(alice, channel.identity(), "hello").await.unwrap();
        let next = follower.await.unwrap().unwrap().unwrap();
        let last = next.value().events.last().unwrap();
        assert_eq!(last.value().message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_storage_error() {
        let chat = chat();
        chat.accounts.backend().set_unavailable(true);
        assert!(matches!(
            chat.login("alice", PASSWORD).await,
            Err(ChatError::Storage(_))
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let config = InchatConfig {
            session_lifetime_secs: 60,
            min_password_length: 12,
            wait_timeout_secs: 3,
            database_file: "x.db".to_string(),
        };
        let settings = ChatSettings::from_config(&config);
        assert_eq!(settings.session_lifetime, chrono::Duration::seconds(60));
        assert_eq!(settings.password_policy.min_length, 12);
        assert_eq!(settings.wait_timeout, Duration::from_secs(3));
    }
}
