//! SLI Index - Social-Livelihood Index scoring and scheme blending
//!
//! Turns a table of raw survey/sensor indicators into latent block scores and
//! a composite index through a deterministic pipeline: min-max normalization →
//! weighted block scoring → structural model fit (external estimator) →
//! result tables. Score tables from three weighting schemes can then be
//! blended into one consensus table.
//!
//! ## Modules
//!
//! - **Scoring**: [`normalizer`], [`scorer`] and [`weights`] produce the
//!   `HA_score`, `ER_score`, `PO_score` and `SLI_simple` columns
//! - **Model**: [`sem`] describes the latent model and the estimator boundary
//! - **Blending**: [`blend`] combines PW / EW / HW runs with 0.3 / 0.4 / 0.3

pub mod blend;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod scorer;
pub mod sem;
pub mod table;
pub mod types;
pub mod weights;

pub use blend::{BlendCoefficients, SchemeBlender};
pub use error::{ConfigError, SliError};
pub use normalizer::Normalizer;
pub use pipeline::{run_blend, run_scoring, BlendConfig, ScoringConfig, ScoringRun};
pub use scorer::BlockScorer;
pub use sem::{ModelSpec, Objective, ProcessEstimator, SemEstimator, SemFit};
pub use types::{Block, Frame, Scheme};
pub use weights::{BlockWeights, WeightsSource};

/// Crate version reported by the CLI
pub const SLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in logs and reports
pub const PRODUCER_NAME: &str = "sli-index";
