//! Box split orchestration
//!
//! - [`validation`]: split request checks and derived unit computation
//! - [`orchestrator`]: print-then-persist coordination with retry and rollback
//! - [`guard`]: one split per source batch at a time

pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod validation;

pub use error::{PersistError, PrintError, PrintFailure, SplitError, SplitStage, ValidationError};
pub use guard::{BatchLease, BatchLocks};
pub use orchestrator::{SplitOrchestrator, SplitOutcome};
pub use validation::{
    MAX_DIVISIONS, MIN_DIVISIONS, QUANTITY_TOLERANCE, SplitRequest, derive_units,
    derive_units_avoiding, validate,
};
