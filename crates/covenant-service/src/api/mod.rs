//! REST surface under `/api/v1`

mod auth;
pub mod handlers;
mod router;

pub use auth::{require_key, INGEST_KEY_HEADER};
pub use router::create_router;
