//! Ledger persistence contract and the in-memory backend.

use async_trait::async_trait;
use covenant_types::QueryWindow;
use parking_lot::RwLock;

use crate::entry::{EntryStatus, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};

/// Storage behind a [`LedgerStore`](crate::LedgerStore).
///
/// Backends only persist. Sequencing, hashing and the single-writer lock
/// belong to the store.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Most recent entry, if any.
    async fn head(&self) -> LedgerResult<Option<LedgerEntry>>;

    /// Insert a sealed entry. Must reject a sequence that already exists.
    async fn insert(&self, entry: &LedgerEntry) -> LedgerResult<()>;

    async fn get(&self, id: &str) -> LedgerResult<Option<LedgerEntry>>;

    /// Entries newest-first.
    async fn list(&self, window: QueryWindow) -> LedgerResult<Vec<LedgerEntry>>;

    /// Entries with `from <= sequence <= to` in ascending order.
    async fn range(&self, from: u64, to: Option<u64>) -> LedgerResult<Vec<LedgerEntry>>;

    async fn count(&self) -> LedgerResult<u64>;

    /// Overwrite the status column only.
    async fn set_status(&self, id: &str, status: EntryStatus) -> LedgerResult<()>;

    fn label(&self) -> &'static str;
}

/// Process-local backend for tests and development.
#[derive(Debug, Default)]
pub struct MemoryLedgerBackend {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl MemoryLedgerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, sequence: u64, edit: impl FnOnce(&mut LedgerEntry)) {
        let mut guard = self.entries.write();
        let entry = guard
            .iter_mut()
            .find(|e| e.sequence == sequence)
            .unwrap();
        edit(entry);
    }
}

#[async_trait]
impl LedgerBackend for MemoryLedgerBackend {
    async fn head(&self) -> LedgerResult<Option<LedgerEntry>> {
        let guard = self.entries.read();
        Ok(guard.last().cloned())
    }

    async fn insert(&self, entry: &LedgerEntry) -> LedgerResult<()> {
        let mut guard = self.entries.write();
        let expected = guard.len() as u64 + 1;
        if entry.sequence != expected {
            return Err(LedgerError::Conflict(format!(
                "expected sequence {}, got {}",
                expected, entry.sequence
            )));
        }
        guard.push(entry.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> LedgerResult<Option<LedgerEntry>> {
        let guard = self.entries.read();
        Ok(guard.iter().find(|e| e.id == id).cloned())
    }

    async fn list(&self, window: QueryWindow) -> LedgerResult<Vec<LedgerEntry>> {
        let guard = self.entries.read();
        let newest_first: Vec<LedgerEntry> = guard.iter().rev().cloned().collect();
        Ok(window.apply(newest_first))
    }

    async fn range(&self, from: u64, to: Option<u64>) -> LedgerResult<Vec<LedgerEntry>> {
        let guard = self.entries.read();
        Ok(guard
            .iter()
            .filter(|e| e.sequence >= from && to.map_or(true, |to| e.sequence <= to))
            .cloned()
            .collect())
    }

    async fn count(&self) -> LedgerResult<u64> {
        let guard = self.entries.read();
        Ok(guard.len() as u64)
    }

    async fn set_status(&self, id: &str, status: EntryStatus) -> LedgerResult<()> {
        let mut guard = self.entries.write();
        let entry = guard
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        entry.status = status;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}
