//! Application state wiring the chat service to its SQLite backends.
//!
//! `InChat` is generic over backend and hasher traits; `AppState` pins it to
//! the concrete infra implementations. The login session id is kept in
//! `{data_dir}/session` between invocations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use inchat_core::chat::service::{ChatSettings, InChat};
use inchat_infra::config::{database_url, load_config, resolve_data_dir};
use inchat_infra::crypto::password::Argon2PasswordHasher;
use inchat_infra::sqlite::account::SqliteAccountBackend;
use inchat_infra::sqlite::channel::SqliteChannelBackend;
use inchat_infra::sqlite::event::SqliteEventBackend;
use inchat_infra::sqlite::pool::DatabasePool;
use inchat_infra::sqlite::session::SqliteSessionBackend;
use inchat_infra::sqlite::user::SqliteUserBackend;
use inchat_types::config::InchatConfig;
use inchat_types::error::ChatError;
use inchat_types::session::Session;
use inchat_types::stored::{Identity, Stored};

/// `InChat` pinned to the SQLite backends and Argon2id hashing.
pub type ConcreteChat = InChat<
    SqliteUserBackend,
    SqliteAccountBackend,
    SqliteChannelBackend,
    SqliteEventBackend,
    SqliteSessionBackend,
    Argon2PasswordHasher,
>;

const SESSION_FILE: &str = "session";

/// Shared application state for CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ConcreteChat>,
    pub config: InchatConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, open the DB, wire
    /// the chat service.
    pub async fn init() -> Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir, &config))
            .await
            .context("failed to open database")?;

        let sessions = SqliteSessionBackend::new(db_pool.clone());
        if let Err(e) = sessions.purge_expired().await {
            tracing::warn!("failed to purge expired sessions: {e}");
        }

        let chat = InChat::new(
            SqliteUserBackend::new(db_pool.clone()),
            SqliteAccountBackend::new(db_pool.clone()),
            SqliteChannelBackend::new(db_pool.clone()),
            SqliteEventBackend::new(db_pool.clone()),
            sessions,
            Argon2PasswordHasher::new(),
            ChatSettings::from_config(&config),
        );

        Ok(Self {
            chat: Arc::new(chat),
            config,
            data_dir,
            db_pool,
        })
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    /// Remember `session` as the current login.
    pub async fn save_session(&self, session: &Stored<Session>) -> Result<()> {
        write_session_id(&self.session_path(), session.identity()).await
    }

    /// Forget the current login.
    pub async fn clear_session(&self) -> Result<()> {
        match tokio::fs::remove_file(self.session_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("failed to remove session file"),
        }
    }

    /// The current login session, if one is saved and still valid.
    pub async fn current_session(&self) -> Result<Stored<Session>> {
        let Some(id) = read_session_id(&self.session_path()).await? else {
            bail!("not logged in (run `inchat login <username>`)");
        };
        match self.chat.restore_session(id).await {
            Ok(session) => Ok(session),
            Err(ChatError::SessionExpired | ChatError::NotFound) => {
                self.clear_session().await?;
                bail!("session expired, please log in again")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The account behind the current login.
    pub async fn current_account(&self) -> Result<Identity> {
        let session = self.current_session().await?;
        Ok(session.value().account)
    }
}

async fn write_session_id(path: &Path, id: Identity) -> Result<()> {
    tokio::fs::write(path, id.to_string())
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn read_session_id(path: &Path) -> Result<Option<Identity>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    match content.trim().parse::<Identity>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            tracing::warn!("ignoring malformed session file {}", path.display());
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        assert_eq!(read_session_id(&path).await.unwrap(), None);

        let id = Identity::new();
        write_session_id(&path, id).await.unwrap();
        assert_eq!(read_session_id(&path).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn malformed_session_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        tokio::fs::write(&path, "garbage").await.unwrap();
        assert_eq!(read_session_id(&path).await.unwrap(), None);
    }
}
