//! Core types for SLI scoring
//!
//! This module defines the block layout, the weighting schemes and the
//! column-oriented numeric frame that flows between pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-row simple index column produced by a scoring run
pub const SLI_SIMPLE: &str = "SLI_simple";

/// Per-row blended index column produced by a blend run
pub const SLI_BLENDED: &str = "SLI_blended";

/// Latent block of three indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    /// Human Activity (water stress pressure)
    #[serde(rename = "HA")]
    HumanActivity,
    /// Environmental Response
    #[serde(rename = "ER")]
    EnvironmentalResponse,
    /// Psychosocial Outcome
    #[serde(rename = "PO")]
    PsychosocialOutcome,
}

impl Block {
    /// All blocks in model order
    pub const ALL: [Block; 3] = [
        Block::HumanActivity,
        Block::EnvironmentalResponse,
        Block::PsychosocialOutcome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Block::HumanActivity => "HA",
            Block::EnvironmentalResponse => "ER",
            Block::PsychosocialOutcome => "PO",
        }
    }

    /// Indicator columns measuring this block, in weight-vector order
    pub fn indicators(&self) -> &'static [&'static str] {
        match self {
            Block::HumanActivity => &["water_extraction", "dam_density", "well_density"],
            Block::EnvironmentalResponse => {
                &["soil_electrical_cond", "ndvi_decline", "dust_storm_freq"]
            }
            Block::PsychosocialOutcome => {
                &["climate_anxiety", "migration_intent", "place_attachment_loss"]
            }
        }
    }

    /// Column holding this block's score in a scoring run output
    pub fn score_column(&self) -> &'static str {
        match self {
            Block::HumanActivity => "HA_score",
            Block::EnvironmentalResponse => "ER_score",
            Block::PsychosocialOutcome => "PO_score",
        }
    }

    /// Column holding this block's blended score in a blend run output
    pub fn blend_column(&self) -> &'static str {
        match self {
            Block::HumanActivity => "HA_score_blend",
            Block::EnvironmentalResponse => "ER_score_blend",
            Block::PsychosocialOutcome => "PO_score_blend",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every indicator column of every block, in model order
pub fn all_indicators() -> Vec<&'static str> {
    Block::ALL
        .iter()
        .flat_map(|block| block.indicators().iter().copied())
        .collect()
}

/// The four columns every scoring run emits and every blend input requires
pub fn score_columns() -> [&'static str; 4] {
    [
        Block::HumanActivity.score_column(),
        Block::EnvironmentalResponse.score_column(),
        Block::PsychosocialOutcome.score_column(),
        SLI_SIMPLE,
    ]
}

/// Named in-block weighting scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", value(rename_all = "UPPER"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    /// Pressure-weighted
    Pw,
    /// Equal-weighted
    Ew,
    /// Hybrid-weighted
    Hw,
}

impl Scheme {
    pub const ALL: [Scheme; 3] = [Scheme::Pw, Scheme::Ew, Scheme::Hw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Pw => "PW",
            Scheme::Ew => "EW",
            Scheme::Hw => "HW",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PW" => Ok(Scheme::Pw),
            "EW" => Ok(Scheme::Ew),
            "HW" => Ok(Scheme::Hw),
            other => Err(format!("unknown scheme '{}' (use PW, EW or HW)", other)),
        }
    }
}

/// A named numeric column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Unit identifiers carried alongside a frame for row alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// Column-oriented numeric table. All columns share the same row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub key: Option<KeyColumn>,
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn new(key: Option<KeyColumn>, columns: Vec<Column>) -> Self {
        Self { key, columns }
    }

    /// Number of data rows
    pub fn n_rows(&self) -> usize {
        if let Some(key) = &self.key {
            return key.values.len();
        }
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names from `required` that are absent from this frame
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    pub fn push_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub fn key_values(&self) -> Option<&[String]> {
        self.key.as_ref().map(|k| k.values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blocks_are_disjoint_triples() {
        let all = all_indicators();
        assert_eq!(all.len(), 9);
        let mut dedup = all.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 9);
        for block in Block::ALL {
            assert_eq!(block.indicators().len(), 3);
        }
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("pw".parse::<Scheme>().unwrap(), Scheme::Pw);
        assert_eq!(" EW ".parse::<Scheme>().unwrap(), Scheme::Ew);
        assert!("XX".parse::<Scheme>().is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_scheme_cli_values() {
        use clap::ValueEnum;

        let names: Vec<String> = Scheme::value_variants()
            .iter()
            .filter_map(|s| s.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["PW", "EW", "HW"]);
        assert_eq!(<Scheme as ValueEnum>::from_str("hw", true).unwrap(), Scheme::Hw);
    }

    #[test]
    fn test_block_serde_names() {
        let json = serde_json::to_string(&Block::EnvironmentalResponse).unwrap();
        assert_eq!(json, "\"ER\"");
        let scheme: Scheme = serde_json::from_str("\"HW\"").unwrap();
        assert_eq!(scheme, Scheme::Hw);
    }

    #[test]
    fn test_frame_missing_columns() {
        let frame = Frame::new(
            None,
            vec![
                Column::new("HA_score", vec![0.1, 0.2]),
                Column::new("ER_score", vec![0.3, 0.4]),
            ],
        );
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(
            frame.missing_columns(&score_columns()),
            vec!["PO_score".to_string(), "SLI_simple".to_string()]
        );
    }
}
