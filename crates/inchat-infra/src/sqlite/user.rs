//! SQLite backend for `User` entities.

use inchat_core::storage::Backend;
use inchat_types::stored::{Identity, Stored};
use inchat_types::user::User;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{SqliteBackendError, expect_row, format_datetime, parse_datetime, parse_version};

/// SQLite-backed `Backend<User>`.
pub struct SqliteUserBackend {
    pool: DatabasePool,
}

impl SqliteUserBackend {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct UserRow {
    version: String,
    name: String,
    joined: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            version: row.try_get("version")?,
            name: row.try_get("name")?,
            joined: row.try_get("joined")?,
        })
    }

    fn into_stored(self, identity: Identity) -> Result<Stored<User>, SqliteBackendError> {
        let user = User {
            name: self.name,
            joined: parse_datetime(&self.joined)?,
        };
        Ok(Stored::from_parts(identity, parse_version(&self.version)?, user))
    }
}

impl Backend<User> for SqliteUserBackend {
    type Error = SqliteBackendError;

    async fn persist_new(&self, stored: &Stored<User>) -> Result<(), SqliteBackendError> {
        let user = stored.value();
        sqlx::query("INSERT INTO users (id, version, name, joined) VALUES (?, ?, ?, ?)")
            .bind(stored.identity().to_string())
            .bind(stored.version().to_string())
            .bind(&user.name)
            .bind(format_datetime(&user.joined))
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }

    async fn persist_version(&self, stored: &Stored<User>) -> Result<(), SqliteBackendError> {
        let user = stored.value();
        let result = sqlx::query("UPDATE users SET version = ?, name = ?, joined = ? WHERE id = ?")
            .bind(stored.version().to_string())
            .bind(&user.name)
            .bind(format_datetime(&user.joined))
            .bind(stored.identity().to_string())
            .execute(&self.pool.writer)
            .await?;
        expect_row(result, stored.identity())
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<User>>, SqliteBackendError> {
        let row = sqlx::query("SELECT version, name, joined FROM users WHERE id = ?")
            .bind(identity.to_string())
            .fetch_optional(&self.pool.reader)
            .await?;

        match row {
            Some(row) => Ok(Some(UserRow::from_row(&row)?.into_stored(identity)?)),
            None => Ok(None),
        }
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), SqliteBackendError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(identity.to_string())
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}
