//! Pipeline orchestration
//!
//! This module provides the public API for SLI runs. Every run takes its
//! configuration explicitly and computes all results before writing any
//! output file.
//!
//! Scoring run: indicator table → Normalizer → BlockScorer → SemEstimator →
//! score / parameter / fit tables.
//!
//! Blend run: three score tables → SchemeBlender → blended table.

use crate::blend::{BlendCoefficients, SchemeBlender};
use crate::error::SliError;
use crate::normalizer::Normalizer;
use crate::scorer::BlockScorer;
use crate::sem::{ModelSpec, Objective, SemEstimator, SemFit};
use crate::table::{frame_to_csv, records_to_csv, write_frame_to_path, RawTable};
use crate::types::{all_indicators, score_columns, Frame};
use crate::weights::{resolve, BlockWeights, WeightsSource};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-row block and SLI scores
pub const SCORES_FILE: &str = "results_sli_values.csv";

/// Parameter estimates from the model fit
pub const PARAMS_FILE: &str = "results_semopy_params.csv";

/// Fit statistics from the model fit
pub const FIT_FILE: &str = "results_semopy_fit.csv";

/// Default blend output
pub const BLEND_FILE: &str = "blended_sli.csv";

/// Column used to align units when present
pub const DEFAULT_KEY_COLUMN: &str = "unit_id";

/// Configuration of a scoring run
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Requested scheme; overrides the weights source's default
    pub scheme: Option<String>,
    pub weights: Option<WeightsSource>,
    pub objective: Objective,
    /// Unit identifier column carried into the score table when present
    pub key_column: Option<String>,
    pub model: ModelSpec,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scheme: None,
            weights: None,
            objective: Objective::default(),
            key_column: Some(DEFAULT_KEY_COLUMN.to_string()),
            model: ModelSpec::sli(),
        }
    }
}

/// Results of a scoring run, held in memory until written
#[derive(Debug, Clone)]
pub struct ScoringRun {
    pub weights: BlockWeights,
    pub normalized: Frame,
    pub scores: Frame,
    pub fit: Option<SemFit>,
}

impl ScoringRun {
    /// Fit the configured model against the normalized indicators
    pub fn fit_model(
        &mut self,
        estimator: &dyn SemEstimator,
        config: &ScoringConfig,
    ) -> Result<(), SliError> {
        let fit = estimator.fit(&config.model, &self.normalized, config.objective)?;
        info!(
            params = fit.params.len(),
            cfi = fit.stats.cfi,
            rmsea = fit.stats.rmsea,
            "model fitted"
        );
        self.fit = Some(fit);
        Ok(())
    }

    /// Render the score table and, when a fit is attached, the parameter and
    /// fit-statistics tables as `(file name, CSV)` pairs
    pub fn render_outputs(&self) -> Result<Vec<(&'static str, String)>, SliError> {
        let mut files = vec![(SCORES_FILE, frame_to_csv(&self.scores)?)];
        if let Some(fit) = &self.fit {
            files.push((PARAMS_FILE, records_to_csv(&fit.params)?));
            files.push((FIT_FILE, records_to_csv(&[fit.stats])?));
        }
        Ok(files)
    }

    /// Write all rendered tables into `out_dir`, or none of them.
    /// Returns the written paths.
    pub fn write_outputs(&self, out_dir: &Path) -> Result<Vec<PathBuf>, SliError> {
        let files = self.render_outputs()?;
        fs::create_dir_all(out_dir)?;
        commit_outputs(out_dir, &files)
    }
}

/// Stage every file next to its target, then rename the staged files into
/// place. Any failure removes what was staged or already committed.
fn commit_outputs(out_dir: &Path, files: &[(&str, String)]) -> Result<Vec<PathBuf>, SliError> {
    let targets: Vec<PathBuf> = files.iter().map(|(name, _)| out_dir.join(name)).collect();
    if let Some(blocked) = targets.iter().find(|path| path.is_dir()) {
        return Err(SliError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("output path {} is a directory", blocked.display()),
        )));
    }

    let staged: Vec<PathBuf> = files
        .iter()
        .map(|(name, _)| out_dir.join(format!(".{}.partial", name)))
        .collect();
    for ((_, contents), path) in files.iter().zip(&staged) {
        if let Err(e) = fs::write(path, contents) {
            discard(&staged);
            return Err(e.into());
        }
    }

    for (i, (from, to)) in staged.iter().zip(&targets).enumerate() {
        if let Err(e) = fs::rename(from, to) {
            discard(&targets[..i]);
            discard(&staged[i..]);
            return Err(e.into());
        }
    }

    debug!(files = targets.len(), "committed outputs");
    Ok(targets)
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

/// Normalize and score an indicator frame.
///
/// Weights are resolved before any data is touched, so configuration errors
/// surface first.
pub fn score_frame(table: &Frame, config: &ScoringConfig) -> Result<ScoringRun, SliError> {
    let weights = resolve(config.scheme.as_deref(), config.weights.as_ref())?;
    score_with_weights(table, weights)
}

/// Score a raw indicator table, selecting the nine indicator columns
pub fn score_table(raw: &RawTable, config: &ScoringConfig) -> Result<ScoringRun, SliError> {
    let weights = resolve(config.scheme.as_deref(), config.weights.as_ref())?;
    score_raw(raw, config, weights)
}

fn score_raw(
    raw: &RawTable,
    config: &ScoringConfig,
    weights: BlockWeights,
) -> Result<ScoringRun, SliError> {
    let table = raw.select(&all_indicators(), config.key_column.as_deref())?;
    score_with_weights(&table, weights)
}

fn score_with_weights(table: &Frame, weights: BlockWeights) -> Result<ScoringRun, SliError> {
    if table.n_rows() == 0 {
        return Err(SliError::EmptyTable("indicators".to_string()));
    }

    let normalized = Normalizer::normalize(table)?;
    let scores = BlockScorer::score_all(&normalized, &weights)?;

    info!(
        rows = scores.n_rows(),
        scheme = weights.label(),
        "scored indicator table"
    );

    Ok(ScoringRun {
        weights,
        normalized,
        scores,
        fit: None,
    })
}

/// Run a full scoring job from an input CSV into `out_dir`.
///
/// # Arguments
/// * `input` - Indicator table CSV
/// * `out_dir` - Directory receiving the result tables
/// * `config` - Scheme, weights source, objective and key column
/// * `estimator` - Model estimator; the fit is skipped when `None`
///
/// # Example
/// ```ignore
/// let config = ScoringConfig {
///     scheme: Some("PW".to_string()),
///     weights: Some(WeightsSource::from_path(Path::new("weights.json"))?),
///     ..Default::default()
/// };
/// let run = run_scoring(Path::new("data.csv"), Path::new("out"), &config, None)?;
/// ```
pub fn run_scoring(
    input: &Path,
    out_dir: &Path,
    config: &ScoringConfig,
    estimator: Option<&dyn SemEstimator>,
) -> Result<ScoringRun, SliError> {
    // Configuration errors take precedence over I/O errors
    let weights = resolve(config.scheme.as_deref(), config.weights.as_ref())?;
    let raw = RawTable::from_path(input)?;
    let mut run = score_raw(&raw, config, weights)?;

    match estimator {
        Some(estimator) => run.fit_model(estimator, config)?,
        None => warn!("no SEM estimator configured; skipping model fit"),
    }

    let written = run.write_outputs(out_dir)?;
    info!(
        files = written.len(),
        out_dir = %out_dir.display(),
        scheme = run.weights.label(),
        "scoring run complete"
    );
    Ok(run)
}

/// Configuration of a blend run
#[derive(Debug, Clone)]
pub struct BlendConfig {
    pub coefficients: BlendCoefficients,
    /// Join key used when all three inputs carry it
    pub key_column: Option<String>,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            coefficients: BlendCoefficients::default(),
            key_column: Some(DEFAULT_KEY_COLUMN.to_string()),
        }
    }
}

/// Blend three raw score tables
pub fn blend_tables(
    pw: &RawTable,
    ew: &RawTable,
    hw: &RawTable,
    config: &BlendConfig,
) -> Result<Frame, SliError> {
    let required = score_columns();
    let key = config.key_column.as_deref();

    let pw = pw.select(&required, key)?;
    let ew = ew.select(&required, key)?;
    let hw = hw.select(&required, key)?;

    SchemeBlender::new(config.coefficients).blend(&pw, &ew, &hw)
}

/// Run a full blend job from three score CSVs into `out`
pub fn run_blend(
    pw: &Path,
    ew: &Path,
    hw: &Path,
    out: &Path,
    config: &BlendConfig,
) -> Result<Frame, SliError> {
    let blended = blend_tables(
        &RawTable::from_path(pw)?,
        &RawTable::from_path(ew)?,
        &RawTable::from_path(hw)?,
        config,
    )?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_frame_to_path(out, &blended)?;
    info!(rows = blended.n_rows(), out = %out.display(), "blend run complete");
    Ok(blended)
}
