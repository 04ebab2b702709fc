//! Indicator normalization
//!
//! This module rescales raw indicator columns onto a common 0-1 scale.
//! - Min-max rescaling per column
//! - Constant columns map to all zeros
//! - Non-indicator columns are dropped, the unit key is kept

use crate::error::SliError;
use crate::types::{all_indicators, Column, Frame};
use tracing::{debug, warn};

/// Normalizer for converting raw indicator columns to normalized ones
pub struct Normalizer;

impl Normalizer {
    /// Min-max rescale a single column into [0, 1].
    ///
    /// A constant column (max == min) yields all zeros.
    pub fn minmax(values: &[f64]) -> Vec<f64> {
        let (min, max) = match min_max(values) {
            Some(bounds) => bounds,
            None => return Vec::new(),
        };

        if max == min {
            return vec![0.0; values.len()];
        }

        let range = max - min;
        if range.is_finite() {
            return values.iter().map(|v| (v - min) / range).collect();
        }

        // Span exceeds f64::MAX; halving keeps every term finite
        let (half_min, half_range) = (min / 2.0, max / 2.0 - min / 2.0);
        values
            .iter()
            .map(|v| (v / 2.0 - half_min) / half_range)
            .collect()
    }

    /// Normalize the nine indicator columns of an indicator table
    pub fn normalize(table: &Frame) -> Result<Frame, SliError> {
        let required = all_indicators();
        let missing = table.missing_columns(&required);
        if !missing.is_empty() {
            return Err(SliError::Schema {
                table: "indicators".to_string(),
                missing,
            });
        }

        let mut columns = Vec::with_capacity(required.len());
        for name in required {
            // Presence checked above
            let raw = table.column(name).unwrap_or_default();
            let normalized = Self::minmax(raw);

            if is_constant(raw) {
                warn!(column = name, "constant indicator column normalized to zeros");
            } else {
                debug!(column = name, rows = raw.len(), "normalized indicator column");
            }

            columns.push(Column::new(name, normalized));
        }

        Ok(Frame::new(table.key.clone(), columns))
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

fn is_constant(values: &[f64]) -> bool {
    matches!(min_max(values), Some((lo, hi)) if lo == hi)
}
