//! Error types for SLI scoring and blending

use thiserror::Error;

/// Errors that can occur while scoring, fitting or blending
#[derive(Debug, Error)]
pub enum SliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Table '{table}' is missing required columns: {}", .missing.join(", "))]
    Schema { table: String, missing: Vec<String> },

    #[error("Non-numeric value {value:?} in column '{column}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Dimension mismatch in block {block}: {actual} weights for {expected} indicators")]
    DimensionMismatch {
        block: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid weights for block {block}: {reason}")]
    InvalidWeights { block: String, reason: String },

    #[error("Row count mismatch between blend inputs: PW={pw}, EW={ew}, HW={hw}")]
    RowMismatch { pw: usize, ew: usize, hw: usize },

    #[error("Key mismatch in table '{table}': {reason}")]
    KeyMismatch { table: String, reason: String },

    #[error("Table '{0}' has no data rows")]
    EmptyTable(String),

    #[error("SEM estimator failed: {0}")]
    Estimator(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Weight resolution failures. Always fatal: a run never falls back to
/// uniform weights once a scheme or weights source was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("scheme '{0}' requested without a weights source to map it to vectors")]
    SchemeWithoutSource(String),

    #[error("weights source has no entry for scheme '{0}'")]
    UnknownScheme(String),

    #[error("weights source declares no default scheme and none was requested")]
    NoSchemeSelected,

    #[error("scheme '{scheme}' has no weight vector for block {block}")]
    MissingBlock { scheme: String, block: String },
}
