//! SQLite backend for channel `Event`s.
//!
//! Events live in their own table with a `seq` column recording insertion
//! order. A channel carries its own copy of each event as committed with the
//! channel version (see `channel_events`), so writes here reach readers of
//! the channel only once the channel is bumped.

use inchat_core::storage::Backend;
use inchat_types::channel::{Event, EventKind};
use inchat_types::stored::{Identity, Stored};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::pool::DatabasePool;
use super::{
    SqliteBackendError, expect_row, format_datetime, parse_datetime, parse_identity, parse_version,
};

/// SQLite-backed `Backend<Event>`.
pub struct SqliteEventBackend {
    pool: DatabasePool,
}

impl SqliteEventBackend {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const EVENT_COLUMNS: &str = "id, version, channel_id, time, sender, kind, message";

pub(crate) struct EventRow {
    id: String,
    version: String,
    channel_id: String,
    time: String,
    sender: String,
    kind: String,
    message: Option<String>,
}

impl EventRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            channel_id: row.try_get("channel_id")?,
            time: row.try_get("time")?,
            sender: row.try_get("sender")?,
            kind: row.try_get("kind")?,
            message: row.try_get("message")?,
        })
    }

    pub(crate) fn into_stored(self) -> Result<Stored<Event>, SqliteBackendError> {
        let kind: EventKind = self.kind.parse().map_err(SqliteBackendError::Corrupt)?;
        let event = Event {
            channel: parse_identity("channel_id", &self.channel_id)?,
            time: parse_datetime(&self.time)?,
            sender: self.sender,
            kind,
            message: self.message,
        };
        Ok(Stored::from_parts(
            parse_identity("id", &self.id)?,
            parse_version(&self.version)?,
            event,
        ))
    }
}

impl Backend<Event> for SqliteEventBackend {
    type Error = SqliteBackendError;

    async fn persist_new(&self, stored: &Stored<Event>) -> Result<(), SqliteBackendError> {
        let event = stored.value();
        sqlx::query(
            "INSERT INTO events (id, version, channel_id, time, sender, kind, message)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stored.identity().to_string())
        .bind(stored.version().to_string())
        .bind(event.channel.to_string())
        .bind(format_datetime(&event.time))
        .bind(&event.sender)
        .bind(event.kind.to_string())
        .bind(&event.message)
        .execute(&self.pool.writer)
        .await?;
        Ok(())
    }

    async fn persist_version(&self, stored: &Stored<Event>) -> Result<(), SqliteBackendError> {
        let event = stored.value();
        // `seq` is left alone so an edited event keeps its place.
        let result = sqlx::query(
            "UPDATE events SET version = ?, time = ?, sender = ?, kind = ?, message = ?
             WHERE id = ?",
        )
        .bind(stored.version().to_string())
        .bind(format_datetime(&event.time))
        .bind(&event.sender)
        .bind(event.kind.to_string())
        .bind(&event.message)
        .bind(stored.identity().to_string())
        .execute(&self.pool.writer)
        .await?;
        expect_row(result, stored.identity())
    }

    async fn fetch(&self, identity: Identity) -> Result<Option<Stored<Event>>, SqliteBackendError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(identity.to_string())
            .fetch_optional(&self.pool.reader)
            .await?;

        match row {
            Some(row) => Ok(Some(EventRow::from_row(&row)?.into_stored()?)),
            None => Ok(None),
        }
    }

    async fn mark_deleted(&self, identity: Identity) -> Result<(), SqliteBackendError> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(identity.to_string())
            .execute(&self.pool.writer)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use inchat_types::channel::Channel;

    use super::*;
    use crate::sqlite::channel::SqliteChannelBackend;
    use crate::sqlite::test_support::test_pool;

    #[tokio::test]
    async fn test_event_round_trip_and_edit() {
        let (pool, _dir) = test_pool().await;
        let channels = SqliteChannelBackend::new(pool.clone());
        let events = SqliteEventBackend::new(pool);

        let channel = Stored::new(Channel::new("general"));
        channels.persist_new(&channel).await.unwrap();

        let posted = Stored::new(Event::message(channel.identity(), Utc::now(), "alice", "hi"));
        events.persist_new(&posted).await.unwrap();
        assert_eq!(events.fetch(posted.identity()).await.unwrap(), Some(posted.clone()));

        let edited = posted.new_version(posted.value().with_message("hello"));
        events.persist_version(&edited).await.unwrap();
        let fetched = events.fetch(posted.identity()).await.unwrap().unwrap();
        assert_eq!(fetched.value().message.as_deref(), Some("hello"));
        assert_eq!(fetched.version(), edited.version());
    }

    #[tokio::test]
    async fn test_event_requires_existing_channel() {
        let (pool, _dir) = test_pool().await;
        let events = SqliteEventBackend::new(pool);
        let orphan = Stored::new(Event::join(Identity::new(), Utc::now(), "alice"));
        assert!(matches!(
            events.persist_new(&orphan).await,
            Err(SqliteBackendError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_deleting_channel_cascades_to_events() {
        let (pool, _dir) = test_pool().await;
        let channels = SqliteChannelBackend::new(pool.clone());
        let events = SqliteEventBackend::new(pool);

        let channel = Stored::new(Channel::new("general"));
        channels.persist_new(&channel).await.unwrap();
        let join = Stored::new(Event::join(channel.identity(), Utc::now(), "alice"));
        events.persist_new(&join).await.unwrap();

        channels.mark_deleted(channel.identity()).await.unwrap();
        assert_eq!(events.fetch(join.identity()).await.unwrap(), None);
    }
}
