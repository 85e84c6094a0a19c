//! Covenant ledger: an append-only, hash-chained record of every event.
//!
//! Each entry's `record_hash` covers its canonical fields plus the previous
//! entry's `record_hash`, so any in-place edit of a stored row is detectable
//! by [`LedgerStore::verify`]. Status is the only mutable column and is kept
//! out of the hash.
//!
//! Breaks are never repaired here. The store latches into a halted state and
//! refuses further appends.

#![deny(unsafe_code)]

mod backend;
mod entry;
mod error;
pub mod sqlite;
mod store;
mod verify;

pub use backend::{LedgerBackend, MemoryLedgerBackend};
pub use entry::{canonical_json, format_timestamp, EntryStatus, LedgerEntry, NewEntry};
pub use error::{LedgerError, LedgerResult};
pub use sqlite::SqliteLedgerBackend;
pub use store::LedgerStore;
pub use verify::{verify_entries, ChainVerification};
