//! Block scoring
//!
//! This module aggregates normalized indicators into latent block scores:
//! - Weight vectors re-normalized to sum to 1
//! - Uniform weights when none are given
//! - Per-row simple SLI as the mean of the three block scores

use crate::error::SliError;
use crate::types::{Block, Column, Frame, SLI_SIMPLE};
use crate::weights::BlockWeights;
use tracing::debug;

/// Scorer for turning normalized indicator columns into block scores
pub struct BlockScorer;

impl BlockScorer {
    /// Effective weights for `n` indicators: uniform when `weights` is
    /// absent, otherwise the input rescaled to sum to 1.
    pub fn effective_weights(
        block: Block,
        n: usize,
        weights: Option<&[f64]>,
    ) -> Result<Vec<f64>, SliError> {
        let weights = match weights {
            None => return Ok(vec![1.0 / n as f64; n]),
            Some(w) => w,
        };

        if weights.len() != n {
            return Err(SliError::DimensionMismatch {
                block: block.as_str().to_string(),
                expected: n,
                actual: weights.len(),
            });
        }

        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SliError::InvalidWeights {
                block: block.as_str().to_string(),
                reason: format!("weight {} is not a non-negative number", bad),
            });
        }

        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(SliError::InvalidWeights {
                block: block.as_str().to_string(),
                reason: "weights sum to zero".to_string(),
            });
        }

        Ok(weights.iter().map(|w| w / sum).collect())
    }

    /// Normalized weight vectors actually applied to each block
    pub fn effective_block_weights(weights: &BlockWeights) -> Result<BlockWeights, SliError> {
        let vector = |block: Block| {
            Self::effective_weights(block, block.indicators().len(), weights.for_block(block))
                .map(Some)
        };

        Ok(BlockWeights {
            scheme: weights.scheme.clone(),
            ha: vector(Block::HumanActivity)?,
            er: vector(Block::EnvironmentalResponse)?,
            po: vector(Block::PsychosocialOutcome)?,
        })
    }

    /// Row-wise weighted sum of `columns` (all of equal length)
    pub fn score(
        block: Block,
        columns: &[&[f64]],
        weights: Option<&[f64]>,
    ) -> Result<Vec<f64>, SliError> {
        let weights = Self::effective_weights(block, columns.len(), weights)?;
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);

        let scores: Vec<f64> = (0..n_rows)
            .map(|row| {
                columns
                    .iter()
                    .zip(&weights)
                    .map(|(column, w)| column[row] * w)
                    .sum::<f64>()
            })
            .collect();

        debug!(block = block.as_str(), weights = ?weights, "scored block");
        Ok(scores)
    }

    /// Score one block of a normalized indicator frame
    pub fn score_block(
        normalized: &Frame,
        block: Block,
        weights: Option<&[f64]>,
    ) -> Result<Vec<f64>, SliError> {
        let mut columns = Vec::with_capacity(block.indicators().len());
        let mut missing = Vec::new();
        for name in block.indicators() {
            match normalized.column(name) {
                Some(values) => columns.push(values),
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(SliError::Schema {
                table: "indicators".to_string(),
                missing,
            });
        }

        Self::score(block, &columns, weights)
    }

    /// Score all three blocks and derive `SLI_simple`.
    ///
    /// Output columns: `HA_score`, `ER_score`, `PO_score`, `SLI_simple`,
    /// with the unit key carried over from `normalized`.
    pub fn score_all(normalized: &Frame, weights: &BlockWeights) -> Result<Frame, SliError> {
        let mut block_scores = Vec::with_capacity(Block::ALL.len());
        for block in Block::ALL {
            let scores = Self::score_block(normalized, block, weights.for_block(block))?;
            block_scores.push(Column::new(block.score_column(), scores));
        }

        let n_rows = normalized.n_rows();
        let sli_simple: Vec<f64> = (0..n_rows)
            .map(|row| {
                let total: f64 = block_scores.iter().map(|c| c.values[row]).sum();
                total / block_scores.len() as f64
            })
            .collect();

        let mut scores = Frame::new(normalized.key.clone(), block_scores);
        scores.push_column(Column::new(SLI_SIMPLE, sli_simple));
        Ok(scores)
    }
}
