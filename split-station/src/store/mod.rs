//! Inventory store
//!
//! The orchestrator only talks to these traits; schema and SQL dialect
//! live behind them.
//!
//! A [`StoreTransaction`] that is dropped without [`StoreTransaction::commit`]
//! must leave no trace: implementations roll back on drop.

pub mod memory;
pub mod sqlite;

pub use memory::{FailurePlan, MemoryInventoryStore};
pub use sqlite::{SqliteInventoryStore, SqliteSplitTxn};

use shared::models::{BATCH_SEPARATOR, DerivedUnit, SourceBatch};
use thiserror::Error;

/// Store error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The source row changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(format!("Migration failed: {}", err))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional inventory repository
#[allow(async_fn_in_trait)]
pub trait InventoryStore {
    type Txn: StoreTransaction;

    /// Look up a box by its batch number
    async fn find_batch(&self, batch_number: &str) -> StoreResult<SourceBatch>;

    /// Batch numbers of the form `<batch_number>-<anything>` already in use
    async fn derived_batch_ids(&self, batch_number: &str) -> StoreResult<Vec<String>>;

    async fn begin(&self) -> StoreResult<Self::Txn>;
}

/// Writes of one split, all-or-nothing
#[allow(async_fn_in_trait)]
pub trait StoreTransaction {
    /// Set the source box (detail and packing rows) to `new_qty`, recording provenance
    ///
    /// Fails with [`StoreError::Conflict`] when the packed quantity no longer
    /// matches `source.pack_qty`.
    async fn update_source_quantity(
        &mut self,
        source: &SourceBatch,
        new_qty: f64,
        provenance: &str,
    ) -> StoreResult<()>;

    /// Insert detail and packing rows for a new box, returning the new detail id
    async fn insert_derived_unit(
        &mut self,
        source: &SourceBatch,
        unit: &DerivedUnit,
        provenance: &str,
        acting_user_id: i64,
    ) -> StoreResult<i64>;

    /// Link a new detail row to the user who split it
    async fn record_split_audit(&mut self, acting_user_id: i64, new_detail_id: i64)
    -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Packed quantities are REAL columns; compared with a tolerance far below any unit
pub(crate) const QTY_EPSILON: f64 = 1e-9;

pub(crate) fn same_qty(a: f64, b: f64) -> bool {
    (a - b).abs() < QTY_EPSILON
}

/// Whether `candidate` was derived from `batch_number` (`<batch_number>-...`)
pub(crate) fn is_derived_from(candidate: &str, batch_number: &str) -> bool {
    candidate
        .strip_prefix(batch_number)
        .is_some_and(|rest| rest.starts_with(BATCH_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_qty() {
        assert!(same_qty(100.0, 100.0));
        assert!(same_qty(0.1 + 0.2, 0.3));
        assert!(!same_qty(100.0, 100.0 + 10.0 * QTY_EPSILON));
    }

    #[test]
    fn test_is_derived_from() {
        assert!(is_derived_from("HU1-2", "HU1"));
        assert!(is_derived_from("HU1-2-1", "HU1"));
        assert!(!is_derived_from("HU12-1", "HU1"));
        assert!(!is_derived_from("HU1", "HU1"));
    }
}
