//! Batch (box) models

use serde::{Deserialize, Serialize};

/// Separator between a source batch number and a derived unit index
pub const BATCH_SEPARATOR: char = '-';

/// Snapshot of the box being split
///
/// Read once from the inventory store per operation. Stale as soon as a
/// split on it commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SourceBatch {
    /// Incoming document the detail row belongs to
    pub incoming_id: i64,
    /// Incoming detail row id
    pub detail_id: i64,
    /// Packing row id
    pub packing_id: i64,
    pub item_id: i64,
    pub item_code: String,
    /// Quantity on the incoming detail row
    pub incoming_qty: f64,
    /// Quantity currently packed in this box
    pub pack_qty: f64,
    pub batch_number: String,
    pub location_id: i64,
    pub location_code: String,
}

impl SourceBatch {
    /// Provenance string recorded on every row touched by a split
    ///
    /// Records that the rows came from one box of the prior full quantity.
    pub fn provenance(&self) -> String {
        format!("1 x {}", self.pack_qty)
    }
}

/// One output of a split
///
/// Index 0 is the original box keeping its batch number; indices
/// `1..N` are new boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedUnit {
    pub index: usize,
    pub batch_id: String,
    pub quantity: f64,
}

impl DerivedUnit {
    /// Build the unit at `index` for a source batch number
    pub fn new(source_batch_number: &str, index: usize, quantity: f64) -> Self {
        Self::with_suffix(source_batch_number, index, index, quantity)
    }

    /// Build the unit at `index` with an explicit numeric suffix
    ///
    /// Used when earlier splits of the same box already took the suffix
    /// matching `index`. The suffix is ignored for the original (index 0).
    pub fn with_suffix(source_batch_number: &str, index: usize, suffix: usize, quantity: f64) -> Self {
        let batch_id = if index == 0 {
            source_batch_number.to_string()
        } else {
            format!("{}{}{}", source_batch_number, BATCH_SEPARATOR, suffix)
        };
        Self {
            index,
            batch_id,
            quantity,
        }
    }

    /// Whether this unit is the retained original box
    pub fn is_original(&self) -> bool {
        self.index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_keeps_batch_number() {
        let unit = DerivedUnit::new("HU123", 0, 40.0);
        assert_eq!(unit.batch_id, "HU123");
        assert!(unit.is_original());
    }

    #[test]
    fn test_new_unit_suffix() {
        let unit = DerivedUnit::new("HU123", 2, 25.0);
        assert_eq!(unit.batch_id, "HU123-2");
        assert!(!unit.is_original());
    }

    #[test]
    fn test_explicit_suffix() {
        let unit = DerivedUnit::with_suffix("HU123", 1, 3, 20.0);
        assert_eq!(unit.batch_id, "HU123-3");
        assert_eq!(unit.index, 1);
        assert_eq!(DerivedUnit::with_suffix("HU123", 0, 3, 20.0).batch_id, "HU123");
    }

    #[test]
    fn test_provenance_format() {
        let batch = SourceBatch {
            incoming_id: 1,
            detail_id: 2,
            packing_id: 3,
            item_id: 4,
            item_code: "ART-1".to_string(),
            incoming_qty: 100.0,
            pack_qty: 100.0,
            batch_number: "HU123".to_string(),
            location_id: 5,
            location_code: "A-01".to_string(),
        };
        assert_eq!(batch.provenance(), "1 x 100");

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["batch_number"], "HU123");
    }
}
