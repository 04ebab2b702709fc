//! Weight resolution
//!
//! Maps a weighting scheme name onto one weight vector per block using an
//! external weights source of the form:
//!
//! ```json
//! { "scheme": "EW", "block_weights": { "EW": { "HA": [1, 1, 1], "ER": [1, 1, 1], "PO": [1, 1, 1] } } }
//! ```

use crate::error::{ConfigError, SliError};
use crate::types::Block;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Parsed weights source, loaded once per run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightsSource {
    /// Scheme used when the caller does not request one
    #[serde(default)]
    pub scheme: Option<String>,
    /// Scheme name -> block name -> raw weight vector
    #[serde(default)]
    pub block_weights: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl WeightsSource {
    pub fn from_json(json: &str) -> Result<Self, SliError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, SliError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Scheme names present in this source
    pub fn schemes(&self) -> Vec<&str> {
        self.block_weights.keys().map(String::as_str).collect()
    }
}

/// Raw weight vector per block. `None` means uniform weighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockWeights {
    /// Scheme the vectors were taken from, if any
    pub scheme: Option<String>,
    #[serde(rename = "HA")]
    pub ha: Option<Vec<f64>>,
    #[serde(rename = "ER")]
    pub er: Option<Vec<f64>>,
    #[serde(rename = "PO")]
    pub po: Option<Vec<f64>>,
}

impl BlockWeights {
    /// Uniform weighting for every block
    pub fn uniform() -> Self {
        Self::default()
    }

    pub fn for_block(&self, block: Block) -> Option<&[f64]> {
        match block {
            Block::HumanActivity => self.ha.as_deref(),
            Block::EnvironmentalResponse => self.er.as_deref(),
            Block::PsychosocialOutcome => self.po.as_deref(),
        }
    }

    /// Label for logs and reports
    pub fn label(&self) -> &str {
        self.scheme.as_deref().unwrap_or("equal-weights")
    }
}

/// Resolve the three block weight vectors.
///
/// An explicit `scheme` overrides the source's declared default. No scheme
/// and no source means uniform weights; every other gap is a configuration
/// error.
pub fn resolve(
    scheme: Option<&str>,
    source: Option<&WeightsSource>,
) -> Result<BlockWeights, ConfigError> {
    let source = match (scheme, source) {
        (None, None) => return Ok(BlockWeights::uniform()),
        (Some(name), None) => return Err(ConfigError::SchemeWithoutSource(name.to_string())),
        (_, Some(source)) => source,
    };

    let selected = scheme
        .or(source.scheme.as_deref())
        .ok_or(ConfigError::NoSchemeSelected)?;

    let entry = source
        .block_weights
        .get(selected)
        .ok_or_else(|| ConfigError::UnknownScheme(selected.to_string()))?;

    let vector = |block: Block| {
        entry
            .get(block.as_str())
            .cloned()
            .ok_or_else(|| ConfigError::MissingBlock {
                scheme: selected.to_string(),
                block: block.as_str().to_string(),
            })
    };

    Ok(BlockWeights {
        scheme: Some(selected.to_string()),
        ha: Some(vector(Block::HumanActivity)?),
        er: Some(vector(Block::EnvironmentalResponse)?),
        po: Some(vector(Block::PsychosocialOutcome)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_source() -> WeightsSource {
        WeightsSource::from_json(
            r#"{
                "scheme": "EW",
                "block_weights": {
                    "PW": { "HA": [0.5, 0.3, 0.2], "ER": [0.4, 0.4, 0.2], "PO": [0.2, 0.5, 0.3] },
                    "EW": { "HA": [1, 1, 1], "ER": [1, 1, 1], "PO": [1, 1, 1] },
                    "HW": { "HA": [2, 1, 1], "ER": [1, 2, 1], "PO": [1, 1, 2] }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_no_scheme_no_source_is_uniform() {
        let weights = resolve(None, None).unwrap();
        assert_eq!(weights, BlockWeights::uniform());
        assert_eq!(weights.label(), "equal-weights");
    }

    #[test]
    fn test_default_scheme_from_source() {
        let source = sample_source();
        let weights = resolve(None, Some(&source)).unwrap();
        assert_eq!(weights.scheme.as_deref(), Some("EW"));
        assert_eq!(weights.ha, Some(vec![1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_explicit_scheme_overrides_default() {
        let source = sample_source();
        let weights = resolve(Some("PW"), Some(&source)).unwrap();
        assert_eq!(weights.scheme.as_deref(), Some("PW"));
        assert_eq!(
            weights.for_block(Block::PsychosocialOutcome),
            Some([0.2, 0.5, 0.3].as_slice())
        );
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let source = sample_source();
        let err = resolve(Some("XX"), Some(&source)).unwrap_err();
        assert_eq!(err, ConfigError::UnknownScheme("XX".to_string()));
    }

    #[test]
    fn test_scheme_without_source_is_config_error() {
        let err = resolve(Some("PW"), None).unwrap_err();
        assert_eq!(err, ConfigError::SchemeWithoutSource("PW".to_string()));
    }

    #[test]
    fn test_source_without_default_or_request() {
        let mut source = sample_source();
        source.scheme = None;
        let err = resolve(None, Some(&source)).unwrap_err();
        assert_eq!(err, ConfigError::NoSchemeSelected);
    }

    #[test]
    fn test_missing_block_entry() {
        let source = WeightsSource::from_json(
            r#"{"block_weights": {"HW": {"HA": [1, 2, 1], "ER": [1, 1, 1]}}}"#,
        )
        .unwrap();
        let err = resolve(Some("HW"), Some(&source)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingBlock {
                scheme: "HW".to_string(),
                block: "PO".to_string(),
            }
        );
    }

    #[test]
    fn test_schemes_listed() {
        assert_eq!(sample_source().schemes(), vec!["EW", "HW", "PW"]);
    }

    #[test]
    fn test_malformed_source() {
        assert!(matches!(
            WeightsSource::from_json("{\"block_weights\": 3}"),
            Err(SliError::Json(_))
        ));
    }
}
