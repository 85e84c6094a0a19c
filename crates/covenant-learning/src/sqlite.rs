//! SQLite learning store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use covenant_types::{ConfidenceLevel, DecisionKind, Outcome, QueryWindow};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{LearningError, LearningResult};
use crate::record::LearningRecord;
use crate::store::LearningStore;

/// `learning_records` columns in storage order, with their declarations.
pub const LEARNING_COLUMNS: [(&str, &str); 10] = [
    ("entry_id", "TEXT PRIMARY KEY"),
    ("event_type", "TEXT NOT NULL"),
    ("category", "TEXT NOT NULL"),
    ("decision", "TEXT NOT NULL"),
    ("violation_kinds", "TEXT NOT NULL"),
    ("drift_score", "INTEGER NOT NULL"),
    ("confidence_level", "TEXT NULL"),
    ("outcome", "TEXT NOT NULL"),
    ("outcome_at", "TEXT NULL"),
    ("recorded_at", "TEXT NOT NULL"),
];

fn column_names() -> String {
    LEARNING_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> LearningResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LearningError::Storage(format!("bad timestamp '{value}': {e}")))
}

fn parse<T: FromStr>(value: &str) -> LearningResult<T>
where
    T::Err: std::fmt::Display,
{
    T::from_str(value).map_err(|e| LearningError::Storage(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct SqliteLearningStore {
    pool: SqlitePool,
}

impl SqliteLearningStore {
    pub async fn new(pool: SqlitePool) -> LearningResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> LearningResult<()> {
        let columns = LEARNING_COLUMNS
            .iter()
            .map(|(name, decl)| format!("{name} {decl}"))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS learning_records ({columns})"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| LearningError::Storage(format!("sqlite schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_learning_category ON learning_records (category, outcome)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LearningError::Storage(format!("sqlite index create failed: {e}")))?;
        Ok(())
    }

    async fn fetch(
        &self,
        filter: &str,
        window: QueryWindow,
    ) -> LearningResult<Vec<LearningRecord>> {
        let limit = if window.limit == 0 {
            -1
        } else {
            window.limit as i64
        };
        let sql = format!(
            "SELECT {} FROM learning_records {filter} ORDER BY rowid DESC LIMIT ? OFFSET ?",
            column_names()
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(window.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode).collect()
    }
}

fn decode(row: &SqliteRow) -> LearningResult<LearningRecord> {
    let decision: String = row.try_get("decision")?;
    let kinds: String = row.try_get("violation_kinds")?;
    let drift: i64 = row.try_get("drift_score")?;
    let confidence: Option<String> = row.try_get("confidence_level")?;
    let outcome: String = row.try_get("outcome")?;
    let outcome_at: Option<String> = row.try_get("outcome_at")?;
    let recorded_at: String = row.try_get("recorded_at")?;

    Ok(LearningRecord {
        entry_id: row.try_get("entry_id")?,
        event_type: row.try_get("event_type")?,
        category: row.try_get("category")?,
        decision: parse::<DecisionKind>(&decision)?,
        violation_kinds: serde_json::from_str(&kinds)?,
        drift_score: u32::try_from(drift)
            .map_err(|_| LearningError::Storage(format!("bad drift_score {drift}")))?,
        confidence_level: confidence
            .as_deref()
            .map(parse::<ConfidenceLevel>)
            .transpose()?,
        outcome: parse::<Outcome>(&outcome)?,
        outcome_at: outcome_at.as_deref().map(parse_ts).transpose()?,
        recorded_at: parse_ts(&recorded_at)?,
    })
}

#[async_trait]
impl LearningStore for SqliteLearningStore {
    async fn insert(&self, record: &LearningRecord) -> LearningResult<()> {
        let placeholders = vec!["?"; LEARNING_COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO learning_records ({}) VALUES ({placeholders})",
            column_names()
        );
        sqlx::query(&sql)
            .bind(&record.entry_id)
            .bind(&record.event_type)
            .bind(&record.category)
            .bind(record.decision.as_str())
            .bind(serde_json::to_string(&record.violation_kinds)?)
            .bind(i64::from(record.drift_score))
            .bind(record.confidence_level.map(|c| c.as_str()))
            .bind(record.outcome.as_str())
            .bind(record.outcome_at.as_ref().map(ts))
            .bind(ts(&record.recorded_at))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    LearningError::Duplicate(record.entry_id.clone())
                }
                other => LearningError::Storage(format!("sqlite insert failed: {other}")),
            })?;
        Ok(())
    }

    async fn get(&self, entry_id: &str) -> LearningResult<Option<LearningRecord>> {
        let sql = format!(
            "SELECT {} FROM learning_records WHERE entry_id = ?",
            column_names()
        );
        let row = sqlx::query(&sql)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn label(
        &self,
        entry_id: &str,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> LearningResult<LearningRecord> {
        // The PENDING guard in the WHERE clause makes the label a single
        // compare-and-set.
        let result = sqlx::query(
            "UPDATE learning_records SET outcome = ?, outcome_at = ? \
             WHERE entry_id = ? AND outcome = 'PENDING'",
        )
        .bind(outcome.as_str())
        .bind(ts(&at))
        .bind(entry_id)
        .execute(&self.pool)
        .await?;

        let current = self
            .get(entry_id)
            .await?
            .ok_or_else(|| LearningError::NotFound(entry_id.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(LearningError::AlreadyLabeled(entry_id.to_string()));
        }
        Ok(current)
    }

    async fn list(&self, window: QueryWindow) -> LearningResult<Vec<LearningRecord>> {
        self.fetch("", window).await
    }

    async fn labeled(&self) -> LearningResult<Vec<LearningRecord>> {
        self.fetch("WHERE outcome <> 'PENDING'", QueryWindow::default())
            .await
    }

    fn backend_label(&self) -> &'static str {
        "sqlite"
    }
}
