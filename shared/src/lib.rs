//! Shared types for the split station
//!
//! Value types passed between the printer library, the orchestrator
//! and whatever inventory store backs them.

pub mod models;
pub mod util;

// Re-exports
pub use models::{DerivedUnit, SourceBatch, User};
pub use serde::{Deserialize, Serialize};
