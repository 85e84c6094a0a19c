//! The append-only ledger store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use covenant_types::QueryWindow;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::backend::{LedgerBackend, MemoryLedgerBackend};
use crate::entry::{EntryStatus, LedgerEntry, NewEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::verify::{verify_entries, ChainVerification};

/// Hash-chained ledger over a [`LedgerBackend`].
///
/// Writes (appends and status changes) are serialized by a store-scoped lock
/// so every append reads the true head. A failed verification latches the
/// store into a halted state; appends and status changes are refused from
/// then on.
pub struct LedgerStore {
    backend: Arc<dyn LedgerBackend>,
    write_lock: Mutex<()>,
    /// Sequence of the first detected break, 0 while healthy.
    halted_at: AtomicU64,
}

impl LedgerStore {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
            halted_at: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerBackend::new()))
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend.label()
    }

    /// Sequence of the break that halted the store.
    pub fn halted_at(&self) -> Option<u64> {
        match self.halted_at.load(Ordering::SeqCst) {
            0 => None,
            sequence => Some(sequence),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted_at().is_some()
    }

    fn ensure_running(&self) -> LedgerResult<()> {
        match self.halted_at() {
            Some(sequence) => Err(LedgerError::ChainIntegrity {
                sequence,
                reason: "ledger halted after integrity fault".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Append a new entry at the head of the chain.
    pub async fn append(&self, new: NewEntry) -> LedgerResult<LedgerEntry> {
        new.validate()?;
        self.ensure_running()?;

        let _guard = self.write_lock.lock().await;
        let head = self.backend.head().await?;
        let (sequence, previous_hash) = match head {
            Some(head) => (head.sequence + 1, head.record_hash),
            None => (1, String::new()),
        };

        let entry = new.seal(sequence, previous_hash);
        self.backend.insert(&entry).await?;

        debug!(
            entry_id = %entry.id,
            sequence = entry.sequence,
            event_type = %entry.event_type,
            "Ledger entry appended"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: &str) -> LedgerResult<Option<LedgerEntry>> {
        self.backend.get(id).await
    }

    /// Entries newest-first.
    pub async fn list(&self, window: QueryWindow) -> LedgerResult<Vec<LedgerEntry>> {
        self.backend.list(window).await
    }

    pub async fn len(&self) -> LedgerResult<u64> {
        self.backend.count().await
    }

    pub async fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Record hash of the current head, empty for an empty ledger.
    pub async fn head_hash(&self) -> LedgerResult<String> {
        Ok(self
            .backend
            .head()
            .await?
            .map(|head| head.record_hash)
            .unwrap_or_default())
    }

    /// Move an entry along DRAFT -> VERIFIED -> FINAL (or ERROR).
    pub async fn update_status(&self, id: &str, status: EntryStatus) -> LedgerResult<LedgerEntry> {
        let _guard = self.write_lock.lock().await;
        self.ensure_running()?;
        let mut entry = self
            .backend
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if !entry.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                from: entry.status,
                to: status,
            });
        }

        self.backend.set_status(id, status).await?;
        info!(entry_id = %id, from = %entry.status, to = %status, "Ledger entry status changed");
        entry.status = status;
        Ok(entry)
    }

    /// Verify the whole chain from genesis.
    pub async fn verify(&self) -> LedgerResult<ChainVerification> {
        let entries = self.backend.range(1, None).await?;
        let result = verify_entries(&entries, None);
        self.observe(&result);
        Ok(result)
    }

    /// Verify `from..=to`, anchored on the predecessor of `from`.
    pub async fn verify_range(
        &self,
        from: u64,
        to: Option<u64>,
    ) -> LedgerResult<ChainVerification> {
        if from == 0 {
            return Err(LedgerError::Validation("sequences start at 1".to_string()));
        }
        if let Some(to) = to {
            if to < from {
                return Err(LedgerError::Validation(format!(
                    "empty range {from}..={to}"
                )));
            }
        }

        if from == 1 {
            let entries = self.backend.range(1, to).await?;
            let result = verify_entries(&entries, None);
            self.observe(&result);
            return Ok(result);
        }

        let mut entries = self.backend.range(from - 1, to).await?;
        let anchor = match entries.first() {
            Some(first) if first.sequence == from - 1 => entries.remove(0),
            Some(_) => {
                let result = ChainVerification {
                    intact: false,
                    total_entries: entries.len() as u64,
                    verified_entries: 0,
                    first_break: Some(from - 1),
                    reason: Some(format!("entry {} is missing", from - 1)),
                };
                self.observe(&result);
                return Ok(result);
            }
            None => {
                return Err(LedgerError::Validation(format!(
                    "range start {from} is past the head"
                )))
            }
        };

        let result = verify_entries(&entries, Some(&anchor));
        self.observe(&result);
        Ok(result)
    }

    fn observe(&self, result: &ChainVerification) {
        if let Some(sequence) = result.first_break {
            let _ = self
                .halted_at
                .compare_exchange(0, sequence, Ordering::SeqCst, Ordering::SeqCst);
            error!(
                sequence,
                reason = result.reason.as_deref().unwrap_or_default(),
                "Ledger chain integrity fault, automated processing halted"
            );
        } else {
            debug!(entries = result.total_entries, "Ledger chain verified");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_types::Actor;

    fn note(text: &str) -> NewEntry {
        NewEntry::new(Actor::Human, "NOTE", text)
    }

    async fn store_with(n: usize) -> (Arc<MemoryLedgerBackend>, LedgerStore) {
        let backend = Arc::new(MemoryLedgerBackend::new());
        let store = LedgerStore::new(backend.clone());
        for i in 0..n {
            store.append(note(&format!("entry {i}"))).await.unwrap();
        }
        (backend, store)
    }

    #[tokio::test]
    async fn appends_link_to_previous_hash() {
        let (_, store) = store_with(0).await;
        let first = store.append(note("one")).await.unwrap();
        let second = store.append(note("two")).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(first.previous_hash, "");
        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous_hash, first.record_hash);
        assert_eq!(store.head_hash().await.unwrap(), second.record_hash);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_chain_is_intact() {
        let (_, store) = store_with(0).await;
        let result = store.verify().await.unwrap();
        assert!(result.intact);
        assert_eq!(result.total_entries, 0);
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let (_, store) = store_with(5).await;
        let a = store.verify().await.unwrap();
        let b = store.verify().await.unwrap();
        assert!(a.intact);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn body_edit_reports_the_edited_entry() {
        let (backend, store) = store_with(3).await;
        backend.tamper(2, |e| e.body = "rewritten".to_string());

        let result = store.verify().await.unwrap();
        assert!(!result.intact);
        assert_eq!(result.first_break, Some(2));
        assert_eq!(result.verified_entries, 1);
    }

    #[tokio::test]
    async fn status_edit_does_not_break_chain() {
        let (backend, store) = store_with(3).await;
        backend.tamper(2, |e| e.status = EntryStatus::Final);
        assert!(store.verify().await.unwrap().intact);
    }

    #[tokio::test]
    async fn relinked_entry_is_reported() {
        let (backend, store) = store_with(4).await;
        backend.tamper(3, |e| e.previous_hash = "0".repeat(64));

        let result = store.verify().await.unwrap();
        assert_eq!(result.first_break, Some(3));
    }

    #[tokio::test]
    async fn break_halts_appends() {
        let (backend, store) = store_with(2).await;
        backend.tamper(1, |e| e.actor = Actor::Ai);

        assert!(!store.verify().await.unwrap().intact);
        assert_eq!(store.halted_at(), Some(1));

        let err = store.append(note("after")).await.unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 1, .. }));
    }

    #[tokio::test]
    async fn break_halts_status_changes() {
        let (backend, store) = store_with(3).await;
        let last = store.list(QueryWindow::new(1, 0)).await.unwrap().remove(0);
        backend.tamper(1, |e| e.body.push('!'));

        assert!(!store.verify().await.unwrap().intact);
        let err = store
            .update_status(&last.id, EntryStatus::Verified)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 1, .. }));
        assert_eq!(
            store.get(&last.id).await.unwrap().unwrap().status,
            EntryStatus::Draft
        );
    }

    #[tokio::test]
    async fn verify_range_anchors_on_predecessor() {
        let (backend, store) = store_with(5).await;
        assert!(store.verify_range(3, Some(5)).await.unwrap().intact);

        backend.tamper(4, |e| e.event_type = "OTHER".to_string());
        let tail = store.verify_range(3, None).await.unwrap();
        assert_eq!(tail.first_break, Some(4));
    }

    #[tokio::test]
    async fn verify_range_rejects_bad_bounds() {
        let (_, store) = store_with(2).await;
        assert!(store.verify_range(0, None).await.is_err());
        assert!(store.verify_range(3, Some(2)).await.is_err());
    }

    #[tokio::test]
    async fn status_transitions_are_enforced() {
        let (_, store) = store_with(0).await;
        let entry = store.append(note("filing")).await.unwrap();

        let verified = store.update_status(&entry.id, EntryStatus::Verified).await.unwrap();
        assert_eq!(verified.status, EntryStatus::Verified);
        store.update_status(&entry.id, EntryStatus::Final).await.unwrap();

        let err = store
            .update_status(&entry.id, EntryStatus::Draft)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let missing = store.update_status("nope", EntryStatus::Final).await.unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));

        assert!(store.verify().await.unwrap().intact);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_chain_intact() {
        let store = Arc::new(LedgerStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(note(&format!("writer {i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let result = store.verify().await.unwrap();
        assert!(result.intact);
        assert_eq!(result.total_entries, 32);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_, store) = store_with(4).await;
        let page = store.list(QueryWindow::new(2, 1)).await.unwrap();
        let sequences: Vec<u64> = page.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 2]);
    }
}
