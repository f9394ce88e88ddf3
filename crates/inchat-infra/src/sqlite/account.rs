//! SQLite backend for `Account` entities.
//!
//! Memberships live in `account_channels`, one row per joined channel with
//! an `ordinal` preserving the account's join order. Writes replace the
//! whole membership set in one transaction with the account row.

use inchat_core::chat::directory::AccountDirectory;
use inchat_core::storage::Backend;
use inchat_types::account::{Account, Membership, Role};
use inchat_types::stored::{Identity, Stored};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use super::pool::DatabasePool;
use super::{SqliteBackendError, expect_row, parse_identity, parse_version};

/// SQLite-backed `Backend<Account>` and `AccountDirectory`.
pub struct SqliteAccountBackend {
    pool: DatabasePool,
}

struct AccountRow {
    version: String,
    user_id: String,
    username: String,
    password_hash: String,
}

impl AccountRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            version: row.try_get("version")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}

fn membership_from_row(row: &SqliteRow) -> Result<Membership, SqliteBackendError> {
    let channel: String = row.try_get("channel_id")?;
    let role: String = row.try_get("role")?;
    Ok(Membership {
        alias: row.try_get("alias")?,
        channel: parse_identity("channel_id", &channel)?,
        role: role.parse::<Role>().map_err(SqliteBackendError::Corrupt)?,
    })
}

impl SqliteAccountBackend {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn write_memberships(
        tx: &mut Transaction<'_, Sqlite>,
        stored: &Stored<Account>,
    ) -> Result<(), SqliteBackendError> {
        let id = stored.identity().to_string();
        sqlx::query("DELETE FROM account_channels WHERE account_id = ?")
            .bind(&id)
            .execute(&mut **tx)
            .await?;

        for (ordinal, membership) in stored.value().memberships.iter().enumerate() {
            sqlx::query(
                "INSERT INTO account_channels (account_id, channel_id, alias, ordinal, role)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(membership.channel.to_string())
            .bind(&membership.alias)
            .bind(i64::try_from(ordinal).unwrap_or(i64::MAX))
            .bind(membership.role.to_string())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn fetch_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Stored<Account>>, SqliteBackendError> {
        let mut tx = self.pool.reader.begin().await?;

        let sql = format!(
            "SELECT id, version, user_id, username, password_hash FROM accounts WHERE {column} = ?"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let id: String = row.try_get("id")?;
        let account = AccountRow::from_row(&row)?;

        let membership_rows = sqlx::query(
            "SELECT channel_id, alias, role FROM account_channels
             WHERE account_id = ? ORDER BY ordinal ASC",
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let memberships = membership_rows
            .iter()
            .map(membership_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Stored::from_parts(
            parse_identity("id", &id)?,
            parse_version(&account.version)?,
            Account {
                user: parse_identity("user_id", &account.user_id)?,
                username: account.username,
                password_hash: account.password_hash,
                memberships,
            },
        )))
    }
}

impl Backend<Account> for SqliteAccountBackend {
    type Error = SqliteBackendError;

    async fn persist_new(&self, stored: &Stored<Account>) -> Result<(), SqliteBackendError> {
        let account = stored.value();
        let mut tx = self.pool.writer.begin().await?;
        sqlx::query(
            "INSERT INTO accounts (id, version, user_id, username, password_hash)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(stored.identity().to_string())
        .bind(stored.version().to_string())
        .bind(account.user.to_string())
        .bind(&account.username)
        .bind(&account.password_hash)
        .execute(&mut *tx)
        .await?;
        Self::write_memberships(&mut tx, stored).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn persist_version(&self, stored: &Stored<Account>) -> Result<(), SqliteBackendError> {
        let account = stored.value();
        let mut tx = self.pool.writer.begin().await?;
        let result = sqlx::query(
            "UPDATE accounts SET version = ?, user_id = ?, username = ?, password_hash = ?
             WHERE id = ?",
        )
        .bind(stored.version().to_string())
        .bind(account.user.to_string())
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(stored.identity().to_string())
        .execute(&mut *tx)
        .await?;
        // Dropping the transaction rolls it back.
        expect_row(result, stored.identity())?;
        Self::write_memberships(&mut tx, stored).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<Account>>, SqliteBackendError> {
        self.fetch_where("id", &identity.to_string()).await
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), SqliteBackendError> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(identity.to_string())
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}

impl AccountDirectory for SqliteAccountBackend {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Stored<Account>>, SqliteBackendError> {
        self.fetch_where("username", username).await
    }

    async fn count_with_role(&self, channel: Identity, role: Role) -> Result<usize, SqliteBackendError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM account_channels WHERE channel_id = ? AND role = ?",
        )
        .bind(channel.to_string())
        .bind(role.to_string())
        .fetch_one(&self.pool.reader)
        .await?;
        usize::try_from(count)
            .map_err(|e| SqliteBackendError::Corrupt(format!("invalid count: {e}")))
    }
}
