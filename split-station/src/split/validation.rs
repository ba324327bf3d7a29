//! Split request validation

use super::error::ValidationError;
use shared::models::{DerivedUnit, SourceBatch};
use std::collections::HashSet;

pub const MIN_DIVISIONS: usize = 2;
pub const MAX_DIVISIONS: usize = 100;

/// Allowed gap between the quantity sum and the packed quantity
///
/// Absorbs decimal rounding of operator input, inclusive.
pub const QUANTITY_TOLERANCE: f64 = 0.01;

/// Binary rounding noise ignored on top of the tolerance
const FLOAT_SLACK: f64 = 1e-9;

/// Validated target quantities, in unit order
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRequest {
    quantities: Vec<f64>,
}

impl SplitRequest {
    pub fn quantities(&self) -> &[f64] {
        &self.quantities
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.quantities.iter().sum()
    }
}

/// Check `quantities` against the box being split
pub fn validate(source: &SourceBatch, quantities: &[f64]) -> Result<SplitRequest, ValidationError> {
    if quantities.len() < MIN_DIVISIONS {
        return Err(ValidationError::TooFewDivisions(quantities.len()));
    }
    if quantities.len() > MAX_DIVISIONS {
        return Err(ValidationError::TooManyDivisions(quantities.len()));
    }

    // `!(q > 0)` also rejects NaN
    if let Some((index, &value)) = quantities.iter().enumerate().find(|(_, q)| !(**q > 0.0)) {
        return Err(ValidationError::NonPositiveQuantity { index, value });
    }

    let actual: f64 = quantities.iter().sum();
    if (actual - source.pack_qty).abs() > QUANTITY_TOLERANCE + FLOAT_SLACK {
        return Err(ValidationError::QuantityMismatch {
            expected: source.pack_qty,
            actual,
        });
    }

    Ok(SplitRequest {
        quantities: quantities.to_vec(),
    })
}

/// Materialize the units of a split
///
/// Unit 0 keeps the source batch number; unit `i` becomes `<batch>-<i>`.
pub fn derive_units(source: &SourceBatch, request: &SplitRequest) -> Vec<DerivedUnit> {
    derive_units_avoiding(source, request, &[])
}

/// [`derive_units`] for a box that may have been split before
///
/// New units take the lowest free suffixes, skipping every id in `taken`,
/// so a repeated split never collides with boxes from an earlier one.
pub fn derive_units_avoiding(
    source: &SourceBatch,
    request: &SplitRequest,
    taken: &[String],
) -> Vec<DerivedUnit> {
    let taken: HashSet<&str> = taken.iter().map(String::as_str).collect();
    let mut suffix = 0;

    request
        .quantities
        .iter()
        .enumerate()
        .map(|(index, &quantity)| {
            if index == 0 {
                return DerivedUnit::new(&source.batch_number, 0, quantity);
            }
            loop {
                suffix += 1;
                let unit = DerivedUnit::with_suffix(&source.batch_number, index, suffix, quantity);
                if !taken.contains(unit.batch_id.as_str()) {
                    return unit;
                }
            }
        })
        .collect()
}
