//! Structural equation model boundary
//!
//! Model fitting is delegated to an external estimator. This module defines
//! the model description handed to it, the records it returns, and one
//! adapter that drives an estimator running as a separate process.

use crate::error::SliError;
use crate::types::{Block, Frame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use tracing::{debug, info};

/// Estimation objective label passed through to the estimator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", value(rename_all = "UPPER"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Objective {
    /// Wishart maximum likelihood
    #[default]
    Mlw,
    Ml,
    Uls,
    Gls,
    Wls,
    Dwls,
    Fiml,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Mlw => "MLW",
            Objective::Ml => "ML",
            Objective::Uls => "ULS",
            Objective::Gls => "GLS",
            Objective::Wls => "WLS",
            Objective::Dwls => "DWLS",
            Objective::Fiml => "FIML",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MLW" => Ok(Objective::Mlw),
            "ML" => Ok(Objective::Ml),
            "ULS" => Ok(Objective::Uls),
            "GLS" => Ok(Objective::Gls),
            "WLS" => Ok(Objective::Wls),
            "DWLS" => Ok(Objective::Dwls),
            "FIML" => Ok(Objective::Fiml),
            other => Err(format!("unknown objective '{}'", other)),
        }
    }
}

/// Regression path `target ~ predictors`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regression {
    pub target: Block,
    pub predictors: Vec<Block>,
}

/// Latent-variable model: measurement part plus structural paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub latents: Vec<Block>,
    pub regressions: Vec<Regression>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::sli()
    }
}

impl ModelSpec {
    /// Three latent blocks, HA driving ER, and both driving PO
    pub fn sli() -> Self {
        Self {
            latents: Block::ALL.to_vec(),
            regressions: vec![
                Regression {
                    target: Block::EnvironmentalResponse,
                    predictors: vec![Block::HumanActivity],
                },
                Regression {
                    target: Block::PsychosocialOutcome,
                    predictors: vec![Block::EnvironmentalResponse, Block::HumanActivity],
                },
            ],
        }
    }

    /// Observed variables referenced by the measurement part
    pub fn observed(&self) -> Vec<&'static str> {
        self.latents
            .iter()
            .flat_map(|b| b.indicators().iter().copied())
            .collect()
    }

    /// Render the model in `=~` / `~` description syntax
    pub fn render(&self) -> String {
        let mut out = String::new();
        for latent in &self.latents {
            out.push_str(&format!(
                "{} =~ {}\n",
                latent.as_str(),
                latent.indicators().join(" + ")
            ));
        }
        if !self.regressions.is_empty() {
            out.push('\n');
        }
        for path in &self.regressions {
            let predictors: Vec<&str> = path.predictors.iter().map(Block::as_str).collect();
            out.push_str(&format!(
                "{} ~ {}\n",
                path.target.as_str(),
                predictors.join(" + ")
            ));
        }
        out
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One row of the estimator's parameter table, passed through verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub lval: String,
    pub op: String,
    pub rval: String,
    #[serde(rename = "Estimate")]
    pub estimate: f64,
    #[serde(rename = "Std. Err", alias = "std_err", default)]
    pub std_err: Option<f64>,
    #[serde(rename = "z-value", alias = "z_value", default)]
    pub z_value: Option<f64>,
    #[serde(rename = "p-value", alias = "p_value", default)]
    pub p_value: Option<f64>,
}

/// Fit statistics in output form. Absent TLI / SRMR are NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitStats {
    pub n_obs: u64,
    pub df: f64,
    pub chisq: f64,
    pub p_value: f64,
    pub cfi: f64,
    pub tli: f64,
    pub rmsea: f64,
    pub srmr: f64,
}

/// Fit statistics as reported by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawFitStats {
    pub n_obs: u64,
    pub df: f64,
    #[serde(alias = "chi2")]
    pub chisq: f64,
    pub p_value: f64,
    #[serde(alias = "CFI")]
    pub cfi: f64,
    #[serde(default, alias = "TLI")]
    pub tli: Option<f64>,
    #[serde(alias = "RMSEA")]
    pub rmsea: f64,
    #[serde(default, alias = "SRMR")]
    pub srmr: Option<f64>,
}

impl From<RawFitStats> for FitStats {
    fn from(raw: RawFitStats) -> Self {
        Self {
            n_obs: raw.n_obs,
            df: raw.df,
            chisq: raw.chisq,
            p_value: raw.p_value,
            cfi: raw.cfi,
            tli: raw.tli.unwrap_or(f64::NAN),
            rmsea: raw.rmsea,
            srmr: raw.srmr.unwrap_or(f64::NAN),
        }
    }
}

/// Result of a model fit
#[derive(Debug, Clone, PartialEq)]
pub struct SemFit {
    pub params: Vec<ParamEstimate>,
    pub stats: FitStats,
}

/// Capability to fit a structural equation model
pub trait SemEstimator {
    /// Fit `spec` against the normalized indicator `data`
    fn fit(&self, spec: &ModelSpec, data: &Frame, objective: Objective)
        -> Result<SemFit, SliError>;
}

/// Request sent to an external estimator process
#[derive(Debug, Serialize)]
pub struct FitRequest {
    pub model: String,
    pub objective: Objective,
    pub columns: Vec<&'static str>,
    /// Row-major values, in `columns` order
    pub rows: Vec<Vec<f64>>,
}

impl FitRequest {
    pub fn new(spec: &ModelSpec, data: &Frame, objective: Objective) -> Result<Self, SliError> {
        let observed = spec.observed();
        let missing = data.missing_columns(&observed);
        if !missing.is_empty() {
            return Err(SliError::Schema {
                table: "model data".to_string(),
                missing,
            });
        }

        let columns: Vec<&[f64]> = observed
            .iter()
            .filter_map(|name| data.column(name))
            .collect();
        let rows = (0..data.n_rows())
            .map(|row| columns.iter().map(|c| c[row]).collect())
            .collect();

        Ok(Self {
            model: spec.render(),
            objective,
            columns: observed,
            rows,
        })
    }
}

/// Response expected on an external estimator's stdout
#[derive(Debug, Deserialize)]
pub struct FitResponse {
    pub params: Vec<ParamEstimate>,
    pub stats: RawFitStats,
}

impl FitResponse {
    pub fn from_json(json: &str) -> Result<Self, SliError> {
        serde_json::from_str(json)
            .map_err(|e| SliError::Estimator(format!("malformed estimator response: {}", e)))
    }
}

impl From<FitResponse> for SemFit {
    fn from(response: FitResponse) -> Self {
        Self {
            params: response.params,
            stats: response.stats.into(),
        }
    }
}

/// Estimator running as a child process speaking JSON over stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessEstimator {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcessEstimator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl SemEstimator for ProcessEstimator {
    fn fit(
        &self,
        spec: &ModelSpec,
        data: &Frame,
        objective: Objective,
    ) -> Result<SemFit, SliError> {
        let request = serde_json::to_vec(&FitRequest::new(spec, data, objective)?)?;

        info!(program = %self.program.display(), %objective, "running SEM estimator");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SliError::Estimator(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        // stdin is fed on its own thread while stdout and stderr drain
        let stdin = child.stdin.take();
        let (output, sent) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut pipe) => pipe.write_all(&request),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output = output?;
        if !output.status.success() {
            return Err(SliError::Estimator(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        match sent {
            Ok(Ok(())) => {}
            // The estimator stopped reading early but still succeeded
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("estimator closed stdin before the full request was sent");
            }
            Ok(Err(e)) => {
                return Err(SliError::Estimator(format!(
                    "failed to send request to {}: {}",
                    self.program.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(SliError::Estimator(
                    "request writer thread panicked".to_string(),
                ))
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let fit: SemFit = FitResponse::from_json(&stdout)?.into();
        debug!(params = fit.params.len(), n_obs = fit.stats.n_obs, "estimator finished");
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;
    use pretty_assertions::assert_eq;

    fn sample_response() -> &'static str {
        r#"{
            "params": [
                {"lval": "ER", "op": "~", "rval": "HA", "Estimate": 0.62, "Std. Err": 0.11, "z-value": 5.6, "p-value": 0.0},
                {"lval": "water_extraction", "op": "~", "rval": "HA", "Estimate": 1.0}
            ],
            "stats": {"n_obs": 120, "df": 24, "chi2": 31.4, "p_value": 0.14, "CFI": 0.97, "RMSEA": 0.05}
        }"#
    }

    #[test]
    fn test_render_sli_model() {
        let expected = "HA =~ water_extraction + dam_density + well_density\n\
                        ER =~ soil_electrical_cond + ndvi_decline + dust_storm_freq\n\
                        PO =~ climate_anxiety + migration_intent + place_attachment_loss\n\
                        \n\
                        ER ~ HA\n\
                        PO ~ ER + HA\n";
        assert_eq!(ModelSpec::sli().render(), expected);
    }

    #[test]
    fn test_objective_parse() {
        assert_eq!("mlw".parse::<Objective>().unwrap(), Objective::Mlw);
        assert_eq!(Objective::default().as_str(), "MLW");
        assert!("bayes".parse::<Objective>().is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_objective_cli_values() {
        use clap::ValueEnum;

        for objective in Objective::value_variants() {
            let value = objective.to_possible_value().unwrap();
            assert_eq!(value.get_name(), objective.as_str());
        }
        assert_eq!(
            <Objective as ValueEnum>::from_str("dwls", true).unwrap(),
            Objective::Dwls
        );
    }

    #[test]
    fn test_response_missing_tli_srmr_become_nan() {
        let fit: SemFit = FitResponse::from_json(sample_response()).unwrap().into();

        assert_eq!(fit.params.len(), 2);
        assert_eq!(fit.params[1].std_err, None);
        assert_eq!(fit.stats.n_obs, 120);
        assert!((fit.stats.chisq - 31.4).abs() < 1e-12);
        assert!(fit.stats.tli.is_nan());
        assert!(fit.stats.srmr.is_nan());
    }

    #[test]
    fn test_malformed_response() {
        assert!(matches!(
            FitResponse::from_json("{\"params\": []}"),
            Err(SliError::Estimator(_))
        ));
    }

    #[test]
    fn test_fit_request_rows() {
        let columns = ModelSpec::sli()
            .observed()
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column::new(name, vec![i as f64, 10.0 + i as f64]))
            .collect();
        let data = Frame::new(None, columns);

        let request = FitRequest::new(&ModelSpec::sli(), &data, Objective::Mlw).unwrap();
        assert_eq!(request.columns.len(), 9);
        assert_eq!(request.rows.len(), 2);
        assert_eq!(request.rows[1][8], 18.0);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["objective"], "MLW");
    }

    #[test]
    fn test_fit_request_missing_observed() {
        let data = Frame::new(None, vec![Column::new("water_extraction", vec![1.0])]);
        assert!(matches!(
            FitRequest::new(&ModelSpec::sli(), &data, Objective::Mlw),
            Err(SliError::Schema { .. })
        ));
    }

    #[test]
    fn test_data_checked_before_spawn() {
        let data = Frame::new(None, Vec::new());
        let estimator = ProcessEstimator::new("/nonexistent/sem-estimator");
        let err = estimator
            .fit(&ModelSpec::sli(), &data, Objective::Mlw)
            .unwrap_err();
        assert!(matches!(err, SliError::Schema { .. }));
    }

    /// Nine observed columns with `n_rows` rows, large enough to overflow a pipe
    fn large_frame(n_rows: usize) -> Frame {
        let columns = ModelSpec::sli()
            .observed()
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                Column::new(name, (0..n_rows).map(|r| (r * (i + 1)) as f64 / 7.0).collect())
            })
            .collect();
        Frame::new(None, columns)
    }

    fn shell_estimator(script: &str) -> ProcessEstimator {
        ProcessEstimator::new("/bin/sh").with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_stderr_does_not_stall_fit() {
        let estimator = shell_estimator(
            "head -c 200000 /dev/zero | tr '\\0' w >&2; cat >/dev/null; \
             echo '{\"params\": [], \"stats\": {\"n_obs\": 20000, \"df\": 24, \"chisq\": 1.5, \"p_value\": 0.5, \"cfi\": 1.0, \"rmsea\": 0.0}}'",
        );
        let fit = estimator
            .fit(&ModelSpec::sli(), &large_frame(20_000), Objective::Mlw)
            .unwrap();

        assert!(fit.params.is_empty());
        assert_eq!(fit.stats.n_obs, 20_000);
        assert!(fit.stats.tli.is_nan());
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_reports_status_and_stderr() {
        let estimator = shell_estimator("echo 'semopy missing' >&2; exit 3");
        let err = estimator
            .fit(&ModelSpec::sli(), &large_frame(20_000), Objective::Mlw)
            .unwrap_err();

        match err {
            SliError::Estimator(message) => {
                assert!(message.contains("semopy missing"), "{}", message);
                assert!(message.contains('3'), "{}", message);
            }
            other => panic!("expected estimator error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_estimator_ignoring_stdin_still_parsed() {
        let estimator = shell_estimator(
            "echo '{\"params\": [], \"stats\": {\"n_obs\": 3, \"df\": 1, \"chisq\": 0.1, \"p_value\": 0.9, \"cfi\": 1.0, \"rmsea\": 0.0, \"srmr\": 0.02}}'",
        );
        let fit = estimator
            .fit(&ModelSpec::sli(), &large_frame(20_000), Objective::Uls)
            .unwrap();
        assert_eq!(fit.stats.n_obs, 3);
        assert!((fit.stats.srmr - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_missing_program_is_estimator_error() {
        let columns = ModelSpec::sli()
            .observed()
            .into_iter()
            .map(|name| Column::new(name, vec![0.0, 1.0]))
            .collect();
        let data = Frame::new(None, columns);
        let estimator = ProcessEstimator::new("/nonexistent/sem-estimator");
        let err = estimator
            .fit(&ModelSpec::sli(), &data, Objective::Mlw)
            .unwrap_err();
        assert!(matches!(err, SliError::Estimator(_)));
    }
}
