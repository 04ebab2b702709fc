//! SLI CLI - Command-line interface for SLI Index
//!
//! Commands:
//! - score: Normalize, score and (optionally) fit one indicator table
//! - blend: Blend PW / EW / HW score tables into one consensus table
//! - weights: Print the effective weight vectors for a scheme
//! - model: Print the structural model description

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sli_index::pipeline::{BLEND_FILE, DEFAULT_KEY_COLUMN};
use sli_index::weights::resolve;
use sli_index::{
    run_blend, run_scoring, BlendConfig, BlockScorer, ModelSpec, Objective, ProcessEstimator,
    Scheme, ScoringConfig, SemEstimator, SliError, WeightsSource, PRODUCER_NAME, SLI_VERSION,
};

/// SLI - Social-Livelihood Index scoring and scheme blending
#[derive(Parser)]
#[command(name = "sli")]
#[command(version = SLI_VERSION)]
#[command(about = "Score indicator tables into the Social-Livelihood Index", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize indicators, score the three blocks and fit the model
    Score {
        /// Indicator table CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the result tables
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// In-block weighting scheme; requires --weights
        #[arg(long, value_enum, ignore_case = true)]
        scheme: Option<Scheme>,

        /// Weights JSON mapping scheme -> block -> vector
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Unit identifier column carried into the score table
        #[arg(long, default_value = DEFAULT_KEY_COLUMN)]
        key_column: String,

        /// Estimation objective passed to the estimator
        #[arg(long, value_enum, ignore_case = true, default_value_t = Objective::Mlw)]
        objective: Objective,

        /// External SEM estimator program (JSON over stdin/stdout)
        #[arg(long)]
        estimator: Option<PathBuf>,

        /// Extra argument for the estimator program (repeatable)
        #[arg(long = "estimator-arg", allow_hyphen_values = true)]
        estimator_args: Vec<String>,
    },

    /// Blend the score tables of three weighting runs
    Blend {
        /// Score table of the PW run
        #[arg(long)]
        pw: PathBuf,

        /// Score table of the EW run
        #[arg(long)]
        ew: PathBuf,

        /// Score table of the HW run
        #[arg(long)]
        hw: PathBuf,

        /// Output CSV path
        #[arg(long, default_value = BLEND_FILE)]
        out: PathBuf,

        /// Unit identifier column used to join the three tables
        #[arg(long, default_value = DEFAULT_KEY_COLUMN)]
        key_column: String,
    },

    /// Print the effective (normalized) weight vectors as JSON
    Weights {
        /// Weighting scheme to resolve
        #[arg(long, value_enum, ignore_case = true)]
        scheme: Option<Scheme>,

        /// Weights JSON mapping scheme -> block -> vector
        #[arg(long)]
        weights: Option<PathBuf>,
    },

    /// Print the structural model description
    Model,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "sli=debug,sli_index=debug"
    } else {
        "sli=info,sli_index=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), SliError> {
    match cli.command {
        Commands::Score {
            input,
            out_dir,
            scheme,
            weights,
            key_column,
            objective,
            estimator,
            estimator_args,
        } => {
            let config = ScoringConfig {
                scheme: scheme.map(|s| s.as_str().to_string()),
                weights: load_weights(weights.as_deref())?,
                objective,
                key_column: Some(key_column),
                model: ModelSpec::sli(),
            };
            let estimator =
                estimator.map(|program| ProcessEstimator::new(program).with_args(estimator_args));

            info!(producer = PRODUCER_NAME, version = SLI_VERSION, "starting scoring run");
            let run = run_scoring(
                &input,
                &out_dir,
                &config,
                estimator.as_ref().map(|e| e as &dyn SemEstimator),
            )?;
            info!("Done. Scheme: {}", run.weights.label());
            Ok(())
        }

        Commands::Blend {
            pw,
            ew,
            hw,
            out,
            key_column,
        } => {
            let config = BlendConfig {
                key_column: Some(key_column),
                ..Default::default()
            };
            run_blend(&pw, &ew, &hw, &out, &config)?;
            info!("Saved: {}", out.display());
            Ok(())
        }

        Commands::Weights { scheme, weights } => {
            let source = load_weights(weights.as_deref())?;
            let resolved = resolve(scheme.map(|s| s.as_str()), source.as_ref())?;
            let effective = BlockScorer::effective_block_weights(&resolved)?;
            println!("{}", serde_json::to_string_pretty(&effective)?);
            Ok(())
        }

        Commands::Model => {
            print!("{}", ModelSpec::sli().render());
            Ok(())
        }
    }
}

fn load_weights(path: Option<&Path>) -> Result<Option<WeightsSource>, SliError> {
    path.map(WeightsSource::from_path).transpose()
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SliError> for CliError {
    fn from(e: SliError) -> Self {
        let (code, hint) = match &e {
            SliError::Config(_) => (
                "CONFIG_ERROR",
                Some("Pass --weights with an entry for the requested --scheme"),
            ),
            SliError::Schema { .. } => (
                "SCHEMA_ERROR",
                Some("Check the input header against the required columns"),
            ),
            SliError::NonNumeric { .. } => {
                ("TYPE_ERROR", Some("All indicator cells must be numbers"))
            }
            SliError::DimensionMismatch { .. } => (
                "DIMENSION_MISMATCH",
                Some("Each block weight vector needs one entry per indicator"),
            ),
            SliError::InvalidWeights { .. } => (
                "INVALID_WEIGHTS",
                Some("Weights must be non-negative with a positive sum"),
            ),
            SliError::RowMismatch { .. } => (
                "ROW_MISMATCH",
                Some("Blend inputs must describe the same units in the same order"),
            ),
            SliError::KeyMismatch { .. } => (
                "KEY_MISMATCH",
                Some("Blend inputs must carry the same set of unit keys"),
            ),
            SliError::EmptyTable(_) => ("EMPTY_TABLE", Some("Ensure the input has data rows")),
            SliError::Estimator(_) => (
                "ESTIMATOR_ERROR",
                Some("Check the --estimator program and its stderr"),
            ),
            SliError::Csv(_) => ("CSV_ERROR", Some("Check CSV syntax")),
            SliError::Json(_) => ("JSON_ERROR", Some("Check JSON syntax")),
            SliError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
        };

        CliError {
            code: code.to_string(),
            message: e.to_string(),
            hint: hint.map(str::to_string),
        }
    }
}
