//! SQLite storage layer.
//!
//! `Backend` implementations for every InChat entity, backed by SQLite with
//! WAL mode and split read/write connection pools. Version checks happen in
//! the core store; these backends only read and write rows.

pub mod account;
pub mod channel;
pub mod event;
pub mod pool;
pub mod session;
pub mod user;

use chrono::{DateTime, Utc};
use inchat_types::stored::{Identity, Version};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the SQLite backends.
#[derive(Debug, Error)]
pub enum SqliteBackendError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("entity {0} does not exist")]
    Missing(Identity),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Helpers shared by the row mappers
// ---------------------------------------------------------------------------

fn parse_uuid(field: &str, s: &str) -> Result<Uuid, SqliteBackendError> {
    Uuid::parse_str(s).map_err(|e| SqliteBackendError::Corrupt(format!("invalid {field}: {e}")))
}

pub(crate) fn parse_identity(field: &str, s: &str) -> Result<Identity, SqliteBackendError> {
    parse_uuid(field, s).map(Identity::from_uuid)
}

pub(crate) fn parse_version(s: &str) -> Result<Version, SqliteBackendError> {
    parse_uuid("version", s).map(Version::from_uuid)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqliteBackendError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqliteBackendError::Corrupt(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Fail with `Missing` when an UPDATE touched no row.
pub(crate) fn expect_row(
    result: sqlx::sqlite::SqliteQueryResult,
    identity: Identity,
) -> Result<(), SqliteBackendError> {
    if result.rows_affected() == 0 {
        Err(SqliteBackendError::Missing(identity))
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::pool::DatabasePool;

    /// A migrated pool over a fresh database file.
    pub async fn test_pool() -> (DatabasePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (pool, dir)
    }
}
