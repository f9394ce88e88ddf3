//! SQLite backend for login `Session`s.

use inchat_core::storage::Backend;
use inchat_types::session::Session;
use inchat_types::stored::{Identity, Stored};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{
    SqliteBackendError, expect_row, format_datetime, parse_datetime, parse_identity, parse_version,
};

/// SQLite-backed `Backend<Session>`.
pub struct SqliteSessionBackend {
    pool: DatabasePool,
}

impl SqliteSessionBackend {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Remove every session that expired before now. Returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> Result<u64, SqliteBackendError> {
        let now = format_datetime(&chrono::Utc::now());
        let result = sqlx::query("DELETE FROM sessions WHERE expiry <= ?")
            .bind(now)
            .execute(&self.pool.writer)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(count = result.rows_affected(), "purged expired sessions");
        }
        Ok(result.rows_affected())
    }
}

impl Backend<Session> for SqliteSessionBackend {
    type Error = SqliteBackendError;

    async fn persist_new(&self, stored: &Stored<Session>) -> Result<(), SqliteBackendError> {
        let session = stored.value();
        sqlx::query("INSERT INTO sessions (id, version, account_id, expiry) VALUES (?, ?, ?, ?)")
            .bind(stored.identity().to_string())
            .bind(stored.version().to_string())
            .bind(session.account.to_string())
            .bind(format_datetime(&session.expiry))
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }

    async fn persist_version(&self, stored: &Stored<Session>) -> Result<(), SqliteBackendError> {
        let session = stored.value();
        let result =
            sqlx::query("UPDATE sessions SET version = ?, account_id = ?, expiry = ? WHERE id = ?")
                .bind(stored.version().to_string())
                .bind(session.account.to_string())
                .bind(format_datetime(&session.expiry))
                .bind(stored.identity().to_string())
                .execute(&self.pool.writer)
                .await?;
        expect_row(result, stored.identity())
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<Session>>, SqliteBackendError> {
        let row = sqlx::query("SELECT version, account_id, expiry FROM sessions WHERE id = ?")
            .bind(identity.to_string())
            .fetch_optional(&self.pool.reader)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let version: String = row.try_get("version")?;
        let account: String = row.try_get("account_id")?;
        let expiry: String = row.try_get("expiry")?;
        let session = Session {
            account: parse_identity("account_id", &account)?,
            expiry: parse_datetime(&expiry)?,
        };
        Ok(Some(Stored::from_parts(identity, parse_version(&version)?, session)))
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), SqliteBackendError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(identity.to_string())
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use inchat_types::account::Account;
    use inchat_types::user::User;

    use super::*;
    use crate::sqlite::account::SqliteAccountBackend;
    use crate::sqlite::test_support::test_pool;
    use crate::sqlite::user::SqliteUserBackend;

    async fn account(pool: &DatabasePool) -> Stored<Account> {
        let user = Stored::new(User::new("alice"));
        SqliteUserBackend::new(pool.clone()).persist_new(&user).await.unwrap();
        let account = Stored::new(Account::new(user.identity(), "alice", "$hash"));
        SqliteAccountBackend::new(pool.clone())
            .persist_new(&account)
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (pool, _dir) = test_pool().await;
        let account = account(&pool).await;
        let sessions = SqliteSessionBackend::new(pool);

        let session = Stored::new(Session::starting_now(account.identity(), Duration::hours(24)));
        sessions.persist_new(&session).await.unwrap();
        assert_eq!(sessions.fetch(session.identity()).await.unwrap(), Some(session.clone()));

        sessions.mark_deleted(session.identity()).await.unwrap();
        assert_eq!(sessions.fetch(session.identity()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_sessions() {
        let (pool, _dir) = test_pool().await;
        let account = account(&pool).await;
        let sessions = SqliteSessionBackend::new(pool);

        let live = Stored::new(Session::starting_now(account.identity(), Duration::hours(1)));
        let stale = Stored::new(Session::starting_now(account.identity(), Duration::hours(-1)));
        sessions.persist_new(&live).await.unwrap();
        sessions.persist_new(&stale).await.unwrap();

        assert_eq!(sessions.purge_expired().await.unwrap(), 1);
        assert!(sessions.fetch(live.identity()).await.unwrap().is_some());
        assert!(sessions.fetch(stale.identity()).await.unwrap().is_none());
    }
}
