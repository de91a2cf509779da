use serde::Serialize;

use crate::report::DiscrepancyRecord;
use crate::vote::Decision;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters accumulated while streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Bytes written to the output.
    pub bytes: u64,
    /// Offsets where at least one input disagreed.
    pub discrepancies: u64,
    pub by_threshold: u64,
    pub by_margin: u64,
    pub by_null_retry: u64,
    pub by_operator: u64,
}

impl RunStats {
    pub fn record(&mut self, decision: Decision) {
        self.discrepancies += 1;
        match decision {
            Decision::Threshold => self.by_threshold += 1,
            Decision::Margin => self.by_margin += 1,
            Decision::NullRetry => self.by_null_retry += 1,
            Decision::Operator => self.by_operator += 1,
        }
    }
}

/// What the streaming loop hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub stats: RunStats,
    /// One per discrepancy, ascending offset.
    pub records: Vec<DiscrepancyRecord>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub meta: RunMeta,
    pub file_size: u64,
    pub num_files: usize,
    pub stats: RunStats,
    /// Lowercase hex SHA-256 of the written output.
    pub output_sha256: String,
    pub discrepancies: Vec<DiscrepancyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub inputs: Vec<String>,
    pub output: String,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<f64>,
    pub ignore_nulls: bool,
    pub interactive: bool,
}
