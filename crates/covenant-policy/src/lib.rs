//! Covenant policy registry.
//!
//! Maps an event type to the rule that governs it. Lookup precedence is fixed:
//! exact event type, then the event type's category wildcard, then a
//! compiled-in default carrying the injected enforcement mode. Every event
//! type therefore resolves to some policy even with nothing configured.
//!
//! Rows are seeded at setup and afterwards changed only by the auto-tuner
//! through [`PolicyRegistry::apply`].

#![deny(unsafe_code)]

mod category;
mod error;
mod registry;
mod rule;
mod seed;
pub mod sqlite;
mod store;
mod table;

pub use category::{CategoryResolver, KeywordRule, DEFAULT_FALLBACK};
pub use error::{PolicyError, PolicyResult};
pub use registry::{PolicyRegistry, TuningGuard};
pub use rule::{normalize, DriftBounds, PatternOverride, PolicyRule, WILDCARD};
pub use seed::default_seeds;
pub use sqlite::{SqlitePolicyStore, POLICY_COLUMNS};
pub use store::{MemoryPolicyStore, PolicyStore};
pub use table::{compiled_default, PolicySource, PolicyTable, ResolvedPolicy, DEFAULT_MAX_DRIFT};
