//! Scheme blending
//!
//! Combines the score tables of three weighting runs (PW, EW, HW) into one
//! consensus table with fixed coefficients. Rows are aligned by unit key when
//! every input carries one, otherwise by position with equal row counts.

use crate::error::SliError;
use crate::types::{
    score_columns, Block, Column, Frame, KeyColumn, Scheme, SLI_BLENDED, SLI_SIMPLE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Default blend weights for PW / EW / HW
pub const DEFAULT_BLEND: BlendCoefficients = BlendCoefficients {
    pw: 0.3,
    ew: 0.4,
    hw: 0.3,
};

/// Linear blend coefficients, one per scheme
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendCoefficients {
    pub pw: f64,
    pub ew: f64,
    pub hw: f64,
}

impl Default for BlendCoefficients {
    fn default() -> Self {
        DEFAULT_BLEND
    }
}

impl BlendCoefficients {
    pub fn apply(&self, pw: f64, ew: f64, hw: f64) -> f64 {
        self.pw * pw + self.ew * ew + self.hw * hw
    }
}

/// Blender over three row-aligned score tables
#[derive(Debug, Clone, Default)]
pub struct SchemeBlender {
    pub coefficients: BlendCoefficients,
}

impl SchemeBlender {
    pub fn new(coefficients: BlendCoefficients) -> Self {
        Self { coefficients }
    }

    /// Blend the four score columns of the three scheme tables.
    ///
    /// Output columns: `HA_score_blend`, `ER_score_blend`, `PO_score_blend`,
    /// `SLI_blended`, keyed like the PW table when keys are in use.
    pub fn blend(&self, pw: &Frame, ew: &Frame, hw: &Frame) -> Result<Frame, SliError> {
        for (scheme, frame) in [(Scheme::Pw, pw), (Scheme::Ew, ew), (Scheme::Hw, hw)] {
            validate_input(scheme, frame)?;
        }

        let (key, ew_rows, hw_rows) = align(pw, ew, hw)?;

        let columns = Block::ALL
            .iter()
            .map(|block| (block.score_column(), block.blend_column()))
            .chain([(SLI_SIMPLE, SLI_BLENDED)])
            .map(|(input, output)| {
                self.blend_column([pw, ew, hw], input, output, &ew_rows, &hw_rows)
            })
            .collect();

        debug!(rows = pw.n_rows(), keyed = key.is_some(), "blended scheme tables");
        Ok(Frame::new(key, columns))
    }

    fn blend_column(
        &self,
        [pw, ew, hw]: [&Frame; 3],
        input: &str,
        output: &str,
        ew_rows: &[usize],
        hw_rows: &[usize],
    ) -> Column {
        // Columns validated in `blend`
        let p = pw.column(input).unwrap_or_default();
        let e = ew.column(input).unwrap_or_default();
        let h = hw.column(input).unwrap_or_default();

        let values = p
            .iter()
            .enumerate()
            .map(|(row, &pv)| self.coefficients.apply(pv, e[ew_rows[row]], h[hw_rows[row]]))
            .collect();
        Column::new(output, values)
    }
}

fn validate_input(scheme: Scheme, frame: &Frame) -> Result<(), SliError> {
    let missing = frame.missing_columns(&score_columns());
    if !missing.is_empty() {
        return Err(SliError::Schema {
            table: scheme.as_str().to_string(),
            missing,
        });
    }
    if frame.n_rows() == 0 {
        return Err(SliError::EmptyTable(scheme.as_str().to_string()));
    }
    Ok(())
}

/// Row index into EW and HW for each PW row
fn align(
    pw: &Frame,
    ew: &Frame,
    hw: &Frame,
) -> Result<(Option<KeyColumn>, Vec<usize>, Vec<usize>), SliError> {
    match (&pw.key, &ew.key, &hw.key) {
        (Some(pw_key), Some(ew_key), Some(hw_key)) => {
            let pw_index = index_keys(Scheme::Pw, &pw_key.values)?;
            let ew_rows = join_rows(Scheme::Ew, &pw_key.values, &ew_key.values, pw_index.len())?;
            let hw_rows = join_rows(Scheme::Hw, &pw_key.values, &hw_key.values, pw_index.len())?;
            Ok((Some(pw_key.clone()), ew_rows, hw_rows))
        }
        keys => {
            if keys.0.is_some() || keys.1.is_some() || keys.2.is_some() {
                warn!("unit key present in only some blend inputs; aligning by row position");
            }
            let (p, e, h) = (pw.n_rows(), ew.n_rows(), hw.n_rows());
            if p != e || p != h {
                return Err(SliError::RowMismatch { pw: p, ew: e, hw: h });
            }
            let rows: Vec<usize> = (0..p).collect();
            Ok((None, rows.clone(), rows))
        }
    }
}

fn index_keys(scheme: Scheme, keys: &[String]) -> Result<HashMap<&str, usize>, SliError> {
    let mut index = HashMap::with_capacity(keys.len());
    for (row, key) in keys.iter().enumerate() {
        if index.insert(key.as_str(), row).is_some() {
            return Err(SliError::KeyMismatch {
                table: scheme.as_str().to_string(),
                reason: format!("duplicate key '{}'", key),
            });
        }
    }
    Ok(index)
}

fn join_rows(
    scheme: Scheme,
    reference: &[String],
    keys: &[String],
    expected: usize,
) -> Result<Vec<usize>, SliError> {
    let index = index_keys(scheme, keys)?;
    if index.len() != expected {
        return Err(SliError::KeyMismatch {
            table: scheme.as_str().to_string(),
            reason: format!("{} units, PW has {}", index.len(), expected),
        });
    }

    reference
        .iter()
        .map(|key| {
            index.get(key.as_str()).copied().ok_or_else(|| SliError::KeyMismatch {
                table: scheme.as_str().to_string(),
                reason: format!("key '{}' from PW not found", key),
            })
        })
        .collect()
}
