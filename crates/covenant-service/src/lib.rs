//! Covenant daemon library.
//!
//! Loads [`CovenantConfig`], wires the ledger, policy registry, learning
//! recorder and gatekeeper into an [`AppState`], and serves the `/api/v1`
//! router. The `covenantd` binary is a thin CLI over this crate.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod telemetry;

pub use api::create_router;
pub use config::CovenantConfig;
pub use error::{ApiError, ApiResult, ServiceError, ServiceResult};
pub use server::Server;
pub use state::AppState;
