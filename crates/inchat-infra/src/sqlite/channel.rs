//! SQLite backend for `Channel` entities.
//!
//! A channel version is the `channels` row plus its rows in
//! `channel_events`: a copy of each event snapshot as committed with that
//! version, ordered by `ordinal`. Both are written in one transaction and
//! read in one transaction, so a fetched channel never mixes versions. The
//! `events` table is the event backend's own store and is not consulted
//! here.

use inchat_core::chat::directory::{ChannelDirectory, ChannelSummary};
use inchat_core::storage::Backend;
use inchat_types::channel::Channel;
use inchat_types::stored::{Identity, Stored};
use sqlx::{Row, Sqlite, Transaction};

use super::event::EventRow;
use super::pool::DatabasePool;
use super::{SqliteBackendError, expect_row, format_datetime, parse_identity, parse_version};

/// `channel_events` columns under the names `EventRow` expects.
const COMMITTED_EVENT_COLUMNS: &str =
    "event_id AS id, event_version AS version, channel_id, time, sender, kind, message";

/// SQLite-backed `Backend<Channel>` and `ChannelDirectory`.
pub struct SqliteChannelBackend {
    pool: DatabasePool,
}

impl SqliteChannelBackend {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Replace the committed event list of `stored`'s channel.
    async fn write_events(
        tx: &mut Transaction<'_, Sqlite>,
        stored: &Stored<Channel>,
    ) -> Result<(), SqliteBackendError> {
        let id = stored.identity().to_string();
        sqlx::query("DELETE FROM channel_events WHERE channel_id = ?")
            .bind(&id)
            .execute(&mut **tx)
            .await?;

        for (ordinal, event) in stored.value().events.iter().enumerate() {
            let value = event.value();
            sqlx::query(
                "INSERT INTO channel_events
                     (channel_id, ordinal, event_id, event_version, time, sender, kind, message)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(i64::try_from(ordinal).unwrap_or(i64::MAX))
            .bind(event.identity().to_string())
            .bind(event.version().to_string())
            .bind(format_datetime(&value.time))
            .bind(&value.sender)
            .bind(value.kind.to_string())
            .bind(&value.message)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn fetch_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Stored<Channel>>, SqliteBackendError> {
        let mut tx = self.pool.reader.begin().await?;

        let sql = format!("SELECT id, version, name FROM channels WHERE {column} = ?");
        let Some(row) = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let id: String = row.try_get("id")?;
        let version: String = row.try_get("version")?;
        let name: String = row.try_get("name")?;

        let events_sql = format!(
            "SELECT {COMMITTED_EVENT_COLUMNS} FROM channel_events
             WHERE channel_id = ? ORDER BY ordinal ASC"
        );
        let event_rows = sqlx::query(&events_sql)
            .bind(&id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut events = Vec::with_capacity(event_rows.len());
        for row in &event_rows {
            events.push(EventRow::from_row(row)?.into_stored()?);
        }

        Ok(Some(Stored::from_parts(
            parse_identity("id", &id)?,
            parse_version(&version)?,
            Channel { name, events },
        )))
    }
}

impl Backend<Channel> for SqliteChannelBackend {
    type Error = SqliteBackendError;

    async fn persist_new(&self, stored: &Stored<Channel>) -> Result<(), SqliteBackendError> {
        let mut tx = self.pool.writer.begin().await?;
        sqlx::query("INSERT INTO channels (id, version, name) VALUES (?, ?, ?)")
            .bind(stored.identity().to_string())
            .bind(stored.version().to_string())
            .bind(&stored.value().name)
            .execute(&mut *tx)
            .await?;
        Self::write_events(&mut tx, stored).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn persist_version(&self, stored: &Stored<Channel>) -> Result<(), SqliteBackendError> {
        let mut tx = self.pool.writer.begin().await?;
        let result = sqlx::query("UPDATE channels SET version = ?, name = ? WHERE id = ?")
            .bind(stored.version().to_string())
            .bind(&stored.value().name)
            .bind(stored.identity().to_string())
            .execute(&mut *tx)
            .await?;
        expect_row(result, stored.identity())?;
        Self::write_events(&mut tx, stored).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<Channel>>, SqliteBackendError> {
        self.fetch_where("id", &identity.to_string()).await
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), SqliteBackendError> {
        sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(identity.to_string())
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}

impl ChannelDirectory for SqliteChannelBackend {
    async fn find_by_name(&self, name: &str) -> Result<Option<Stored<Channel>>, SqliteBackendError> {
        self.fetch_where("name", name).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SqliteBackendError> {
        // Identities are UUID v7, so ordering by id is creation order.
        let rows = sqlx::query("SELECT id, name FROM channels ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            channels.push(ChannelSummary {
                identity: parse_identity("id", &id)?,
                name: row.try_get("name")?,
            });
        }
        Ok(channels)
    }
}
