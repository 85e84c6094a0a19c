//! SQLite ledger backend and the shared pool constructor.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use covenant_types::{Actor, QueryWindow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::backend::LedgerBackend;
use crate::entry::{format_timestamp, EntryStatus, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};

const ENTRY_COLUMNS: &str = "sequence, id, timestamp, actor, event_type, body, status, \
     citation, citation_url, tags, previous_hash, record_hash";

/// Open a pool for `url`, creating the database file if needed.
///
/// In-memory databases are per connection in SQLite, so `:memory:` URLs are
/// pinned to a single long-lived connection.
pub async fn connect(url: &str, max_connections: u32) -> LedgerResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| LedgerError::Storage(format!("invalid sqlite url: {e}")))?
        .create_if_missing(true);

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| LedgerError::Storage(format!("sqlite connect failed: {e}")))
}

/// Ledger rows in a `ledger_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteLedgerBackend {
    pool: SqlitePool,
}

impl SqliteLedgerBackend {
    pub async fn new(pool: SqlitePool) -> LedgerResult<Self> {
        let backend = Self { pool };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> LedgerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                sequence INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                actor TEXT NOT NULL,
                event_type TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL,
                citation TEXT NULL,
                citation_url TEXT NULL,
                tags TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                record_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("sqlite schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_event_type ON ledger_entries (event_type)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("sqlite index create failed: {e}")))?;

        Ok(())
    }
}

fn to_i64(value: u64, what: &str) -> LedgerResult<i64> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Validation(format!("{what} exceeds sqlite INTEGER range")))
}

fn decode(row: &SqliteRow) -> LedgerResult<LedgerEntry> {
    fn col<'r, T>(row: &'r SqliteRow, name: &str) -> LedgerResult<T>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| LedgerError::Storage(format!("sqlite decode {name} failed: {e}")))
    }

    let sequence: i64 = col(row, "sequence")?;
    let timestamp: String = col(row, "timestamp")?;
    let actor: String = col(row, "actor")?;
    let status: String = col(row, "status")?;
    let tags: String = col(row, "tags")?;

    Ok(LedgerEntry {
        id: col(row, "id")?,
        sequence: u64::try_from(sequence)
            .map_err(|_| LedgerError::Storage("negative sequence in storage".to_string()))?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| LedgerError::Storage(format!("bad timestamp '{timestamp}': {e}")))?
            .with_timezone(&Utc),
        actor: Actor::from_str(&actor).map_err(|e| LedgerError::Storage(e.to_string()))?,
        event_type: col(row, "event_type")?,
        body: col(row, "body")?,
        status: EntryStatus::from_str(&status).map_err(|e| LedgerError::Storage(e.to_string()))?,
        citation: col(row, "citation")?,
        citation_url: col(row, "citation_url")?,
        tags: serde_json::from_str(&tags)?,
        previous_hash: col(row, "previous_hash")?,
        record_hash: col(row, "record_hash")?,
    })
}

#[async_trait]
impl LedgerBackend for SqliteLedgerBackend {
    async fn head(&self) -> LedgerResult<Option<LedgerEntry>> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY sequence DESC LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode).transpose()
    }

    async fn insert(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let sql = format!(
            "INSERT INTO ledger_entries ({ENTRY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(to_i64(entry.sequence, "sequence")?)
            .bind(&entry.id)
            .bind(format_timestamp(&entry.timestamp))
            .bind(entry.actor.as_str())
            .bind(&entry.event_type)
            .bind(&entry.body)
            .bind(entry.status.as_str())
            .bind(&entry.citation)
            .bind(&entry.citation_url)
            .bind(serde_json::to_string(&entry.tags)?)
            .bind(&entry.previous_hash)
            .bind(&entry.record_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    LedgerError::Conflict(format!("sequence {} already written", entry.sequence))
                }
                other => LedgerError::Storage(format!("sqlite insert failed: {other}")),
            })?;
        Ok(())
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list(&self, window: QueryWindow) -> LedgerResult<Vec<LedgerEntry>> {
        // LIMIT -1 is unbounded in SQLite.
        let limit = if window.limit == 0 {
            -1
        } else {
            to_i64(window.limit as u64, "limit")?
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY sequence DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(to_i64(window.offset as u64, "offset")?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn range(&self, from: u64, to: Option<u64>) -> LedgerResult<Vec<LedgerEntry>> {
        let upper = match to {
            Some(to) => to_i64(to, "range end")?,
            None => i64::MAX,
        };
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE sequence >= ? AND sequence <= ? ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64(from, "range start")?)
            .bind(upper)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn count(&self) -> LedgerResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn set_status(&self, id: &str, status: EntryStatus) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE ledger_entries SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn label(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NewEntry;
    use crate::store::LedgerStore;
    use std::sync::Arc;

    async fn sqlite_store() -> (SqlitePool, LedgerStore) {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let backend = SqliteLedgerBackend::new(pool.clone()).await.unwrap();
        (pool, LedgerStore::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn entries_round_trip_through_sqlite() {
        let (_, store) = sqlite_store().await;
        let written = store
            .append(
                NewEntry::new(Actor::Human, "TAX_FILING", "quarterly return")
                    .with_citation("IRC §162", Some("https://example.org/162".to_string()))
                    .with_tag("q3"),
            )
            .await
            .unwrap();

        let read = store.get(&written.id).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(read.compute_hash(), read.record_hash);
        assert!(store.verify().await.unwrap().intact);
    }

    #[tokio::test]
    async fn overwritten_body_breaks_at_that_row() {
        let (pool, store) = sqlite_store().await;
        for text in ["h1", "h2", "h3"] {
            store
                .append(NewEntry::new(Actor::Ai, "NOTE", text))
                .await
                .unwrap();
        }

        sqlx::query("UPDATE ledger_entries SET body = 'forged' WHERE sequence = 2")
            .execute(&pool)
            .await
            .unwrap();

        let result = store.verify().await.unwrap();
        assert!(!result.intact);
        assert_eq!(result.first_break, Some(2));
        assert!(store.is_halted());
    }

    #[tokio::test]
    async fn status_update_persists_without_rehash() {
        let (_, store) = sqlite_store().await;
        let entry = store
            .append(NewEntry::new(Actor::System, "NOTE", "x"))
            .await
            .unwrap();
        store
            .update_status(&entry.id, EntryStatus::Verified)
            .await
            .unwrap();

        let read = store.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(read.status, EntryStatus::Verified);
        assert_eq!(read.record_hash, entry.record_hash);
        assert!(store.verify().await.unwrap().intact);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_conflict() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let backend = SqliteLedgerBackend::new(pool).await.unwrap();
        let entry = NewEntry::new(Actor::Ai, "NOTE", "x").seal(1, String::new());
        backend.insert(&entry).await.unwrap();

        let mut clash = NewEntry::new(Actor::Ai, "NOTE", "y").seal(1, String::new());
        clash.id = "other".to_string();
        let err = backend.insert(&clash).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let (_, store) = sqlite_store().await;
        for i in 0..5 {
            store
                .append(NewEntry::new(Actor::Ai, "NOTE", format!("n{i}")))
                .await
                .unwrap();
        }
        let page = store.list(QueryWindow::new(2, 0)).await.unwrap();
        assert_eq!(page.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![5, 4]);
        assert_eq!(store.len().await.unwrap(), 5);
    }
}
