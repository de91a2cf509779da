use std::path::PathBuf;

use serde::Deserialize;

use crate::error::RunError;

pub const DEFAULT_THRESHOLD: f64 = 0.65;
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Settings fixed for the duration of a run.
///
/// Every decision receives this explicitly; nothing below the CLI reads
/// process arguments or environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Fraction of all input files that must agree on the winner.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Relative lead over the runner-up accepted when the threshold fails.
    #[serde(default)]
    pub margin: Option<f64>,
    /// Retry a failed vote with 0x00 bytes excluded.
    #[serde(default)]
    pub ignore_nulls: bool,
    /// Ask an operator when a vote cannot be decided.
    #[serde(default)]
    pub interactive: bool,
    /// Narrate every discrepancy. Never changes a decision.
    #[serde(default)]
    pub verbose: bool,
    /// Bytes read from each input per iteration.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            margin: None,
            ignore_nulls: false,
            interactive: false,
            verbose: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            output: OutputConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Replace an existing output file.
    #[serde(default)]
    pub force: bool,
    /// CSV discrepancy report destination.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_toml(input: &str) -> Result<Self, RunError> {
        let config: RunConfig =
            toml::from_str(input).map_err(|e| RunError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RunError::ConfigValidation(format!(
                "threshold must be a value between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }

        if let Some(margin) = self.margin {
            if !margin.is_finite() || margin < 0.0 {
                return Err(RunError::ConfigValidation(format!(
                    "margin must be a non-negative value, got {margin}"
                )));
            }
        }

        if self.chunk_size == 0 {
            return Err(RunError::ConfigValidation(
                "chunk size must be a positive integer".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
