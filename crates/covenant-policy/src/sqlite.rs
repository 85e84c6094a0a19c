//! SQLite policy store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use covenant_types::{ConfidenceLevel, EnforcementMode};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{PolicyError, PolicyResult};
use crate::rule::PolicyRule;
use crate::store::PolicyStore;

/// `policy_rules` columns in storage order, with their declarations.
pub const POLICY_COLUMNS: [(&str, &str); 11] = [
    ("category", "TEXT NOT NULL"),
    ("event_type", "TEXT NOT NULL"),
    ("mode", "TEXT NOT NULL"),
    ("max_drift_score", "INTEGER NOT NULL"),
    ("required_confidence", "TEXT NULL"),
    ("pattern_overrides", "TEXT NOT NULL"),
    ("sample_count", "INTEGER NOT NULL"),
    ("signal_rate", "REAL NOT NULL"),
    ("noise_rate", "REAL NOT NULL"),
    ("auto_tuned", "INTEGER NOT NULL"),
    ("updated_at", "TEXT NOT NULL"),
];

fn column_names() -> String {
    POLICY_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders() -> String {
    vec!["?"; POLICY_COLUMNS.len()].join(", ")
}

#[derive(Debug, Clone)]
pub struct SqlitePolicyStore {
    pool: SqlitePool,
}

impl SqlitePolicyStore {
    pub async fn new(pool: SqlitePool) -> PolicyResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> PolicyResult<()> {
        let columns = POLICY_COLUMNS
            .iter()
            .map(|(name, decl)| format!("{name} {decl}"))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS policy_rules ({columns}, PRIMARY KEY (category, event_type))"
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| PolicyError::Storage(format!("sqlite schema create failed: {e}")))?;
        Ok(())
    }

    fn upsert_sql() -> String {
        let updates = POLICY_COLUMNS
            .iter()
            .skip(2)
            .map(|(name, _)| format!("{name} = excluded.{name}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO policy_rules ({}) VALUES ({}) \
             ON CONFLICT (category, event_type) DO UPDATE SET {updates}",
            column_names(),
            placeholders()
        )
    }

    fn insert_missing_sql() -> String {
        format!(
            "INSERT OR IGNORE INTO policy_rules ({}) VALUES ({})",
            column_names(),
            placeholders()
        )
    }
}

fn bind_rule<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    rule: &PolicyRule,
) -> PolicyResult<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
    let sample_count = i64::try_from(rule.sample_count)
        .map_err(|_| PolicyError::Validation("sample_count exceeds INTEGER range".to_string()))?;
    Ok(query
        .bind(rule.category.clone())
        .bind(rule.event_type.clone())
        .bind(rule.mode.as_str())
        .bind(i64::from(rule.max_drift_score))
        .bind(rule.required_confidence.map(|c| c.as_str()))
        .bind(serde_json::to_string(&rule.pattern_overrides)?)
        .bind(sample_count)
        .bind(rule.signal_rate)
        .bind(rule.noise_rate)
        .bind(rule.auto_tuned)
        .bind(rule.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)))
}

fn decode(row: &SqliteRow) -> PolicyResult<PolicyRule> {
    let mode: String = row.try_get("mode")?;
    let max_drift: i64 = row.try_get("max_drift_score")?;
    let required: Option<String> = row.try_get("required_confidence")?;
    let overrides: String = row.try_get("pattern_overrides")?;
    let sample_count: i64 = row.try_get("sample_count")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(PolicyRule {
        category: row.try_get("category")?,
        event_type: row.try_get("event_type")?,
        mode: EnforcementMode::from_str(&mode).map_err(|e| PolicyError::Storage(e.to_string()))?,
        max_drift_score: u32::try_from(max_drift)
            .map_err(|_| PolicyError::Storage(format!("bad max_drift_score {max_drift}")))?,
        required_confidence: required
            .as_deref()
            .map(ConfidenceLevel::from_str)
            .transpose()
            .map_err(|e| PolicyError::Storage(e.to_string()))?,
        pattern_overrides: serde_json::from_str(&overrides)?,
        sample_count: u64::try_from(sample_count)
            .map_err(|_| PolicyError::Storage(format!("bad sample_count {sample_count}")))?,
        signal_rate: row.try_get("signal_rate")?,
        noise_rate: row.try_get("noise_rate")?,
        auto_tuned: row.try_get("auto_tuned")?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| PolicyError::Storage(format!("bad updated_at '{updated_at}': {e}")))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn load_rules(&self) -> PolicyResult<Vec<PolicyRule>> {
        let sql = format!(
            "SELECT {} FROM policy_rules ORDER BY category ASC, event_type ASC",
            column_names()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode).collect()
    }

    async fn replace_rules(&self, rules: &[PolicyRule]) -> PolicyResult<()> {
        let sql = Self::upsert_sql();
        let mut tx = self.pool.begin().await?;
        for rule in rules {
            bind_rule(sqlx::query(&sql), rule)?
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn seed_rules(&self, rules: &[PolicyRule]) -> PolicyResult<usize> {
        let sql = Self::insert_missing_sql();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for rule in rules {
            let result = bind_rule(sqlx::query(&sql), rule)?
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    fn label(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::PatternOverride;
    use covenant_types::ViolationKind;

    async fn store() -> SqlitePolicyStore {
        let pool = covenant_ledger::sqlite::connect("sqlite::memory:", 1)
            .await
            .unwrap();
        SqlitePolicyStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn rules_round_trip() {
        let store = store().await;
        let mut rule = PolicyRule::category("TAX", EnforcementMode::Strict, 5)
            .with_required_confidence(ConfidenceLevel::KnownUnknown);
        rule.pattern_overrides.insert(
            ViolationKind::Hedging,
            PatternOverride {
                enabled: false,
                weight: 1.0,
            },
        );
        rule.sample_count = 12;
        rule.noise_rate = 0.75;
        rule.auto_tuned = true;

        store.replace_rules(&[rule.clone()]).await.unwrap();
        let loaded = store.load_rules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].pattern_overrides, rule.pattern_overrides);
        assert_eq!(loaded[0].required_confidence, rule.required_confidence);
        assert_eq!(loaded[0].sample_count, 12);
        assert!(loaded[0].auto_tuned);
        assert_eq!(loaded[0].updated_at.timestamp_micros(), rule.updated_at.timestamp_micros());
    }

    #[tokio::test]
    async fn replace_upserts_by_key() {
        let store = store().await;
        store
            .replace_rules(&[PolicyRule::category("TAX", EnforcementMode::Strict, 5)])
            .await
            .unwrap();
        store
            .replace_rules(&[PolicyRule::category("TAX", EnforcementMode::Permissive, 7)])
            .await
            .unwrap();

        let loaded = store.load_rules().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mode, EnforcementMode::Permissive);
        assert_eq!(loaded[0].max_drift_score, 7);
    }

    #[tokio::test]
    async fn seeding_never_overwrites() {
        let store = store().await;
        store
            .replace_rules(&[PolicyRule::category("TAX", EnforcementMode::Permissive, 7)])
            .await
            .unwrap();

        let inserted = store
            .seed_rules(&[
                PolicyRule::category("TAX", EnforcementMode::Strict, 5),
                PolicyRule::category("CREDIT", EnforcementMode::Strict, 8),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let loaded = store.load_rules().await.unwrap();
        let tax = loaded.iter().find(|r| r.category == "TAX").unwrap();
        assert_eq!(tax.mode, EnforcementMode::Permissive);
    }
}
