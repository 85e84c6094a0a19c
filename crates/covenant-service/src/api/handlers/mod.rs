//! API request handlers

mod gate;
mod health;
mod learning;
mod ledger;

pub use gate::*;
pub use health::*;
pub use learning::*;
pub use ledger::*;
