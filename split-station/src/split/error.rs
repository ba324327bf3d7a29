//! Split error types
//!
//! | Error | Retried | Database state |
//! |-------|---------|----------------|
//! | [`ValidationError`] | never | untouched |
//! | `SplitError::Lookup` | never | untouched |
//! | [`PrintError`] | by the operator, after the in-call budget | untouched |
//! | [`PersistError`] | no | rolled back, printed labels orphaned |

use crate::store::StoreError;
use label_printer::{LabelError, LinkError};
use std::fmt;
use thiserror::Error;

/// Malformed split request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("A split needs at least 2 divisions, got {0}")]
    TooFewDivisions(usize),

    #[error("A split allows at most 100 divisions, got {0}")]
    TooManyDivisions(usize),

    #[error("Quantity {index} must be positive, got {value}")]
    NonPositiveQuantity { index: usize, value: f64 },

    #[error("Quantities sum to {actual}, box holds {expected}")]
    QuantityMismatch { expected: f64, actual: f64 },
}

/// Underlying cause of a failed label
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintFailure {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Label(#[from] LabelError),
}

/// A label could not be printed within the retry budget
///
/// Nothing has been persisted yet; the operator may retry the whole split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Label {unit_index} ({batch_id}) failed after {attempts} attempts: {cause}")]
pub struct PrintError {
    pub unit_index: usize,
    pub batch_id: String,
    pub attempts: u32,
    #[source]
    pub cause: PrintFailure,
}

/// The split transaction failed and was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to persist split: {cause}")]
pub struct PersistError {
    #[source]
    pub cause: StoreError,
}

impl From<StoreError> for PersistError {
    fn from(cause: StoreError) -> Self {
        Self { cause }
    }
}

/// Stages of one split, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SplitStage {
    Validating,
    Deriving,
    Printing,
    Persisting,
    Committed,
}

impl fmt::Display for SplitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitStage::Validating => "validating",
            SplitStage::Deriving => "deriving",
            SplitStage::Printing => "printing",
            SplitStage::Persisting => "persisting",
            SplitStage::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Error returned by a split
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("Invalid split request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Print(#[from] PrintError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Reading existing batch ids failed before anything was printed
    #[error("Inventory lookup failed: {0}")]
    Lookup(StoreError),

    #[error("Split cancelled while {stage}")]
    Cancelled { stage: SplitStage },

    #[error("Batch {0} is already being split")]
    BatchBusy(String),
}

impl SplitError {
    /// Stage at which the split stopped
    pub fn stage(&self) -> SplitStage {
        match self {
            SplitError::Validation(_) | SplitError::BatchBusy(_) => SplitStage::Validating,
            SplitError::Lookup(_) => SplitStage::Deriving,
            SplitError::Print(_) => SplitStage::Printing,
            SplitError::Persist(_) => SplitStage::Persisting,
            SplitError::Cancelled { stage } => *stage,
        }
    }

    /// Whether the caller may offer to run the same split again
    ///
    /// True only when nothing was written to the store.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SplitError::Print(_) | SplitError::Cancelled { .. } | SplitError::BatchBusy(_)
        )
    }
}
