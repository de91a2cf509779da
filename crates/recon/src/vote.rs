//! Per-offset decision: which byte wins a column, or why none can.

use std::fmt;

use serde::Serialize;

use crate::column::ByteColumn;
use crate::config::RunConfig;
use crate::error::VoteError;
use crate::tally::Tally;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a discrepancy was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Winner met the agreement threshold.
    Threshold,
    /// Winner missed the threshold but led the runner-up by enough.
    Margin,
    /// Winner emerged once 0x00 bytes were excluded.
    NullRetry,
    /// An operator picked the byte.
    Operator,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Margin => "margin",
            Self::NullRetry => "null_retry",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub byte: u8,
    /// Ranking of the column that was voted on.
    pub tally: Tally,
    /// Winner count over every input file.
    pub agreement: f64,
    pub decision: Decision,
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// Which file contributed which byte to a failed vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub entries: Vec<(usize, u8)>,
    /// Entries were removed (null filtering) before voting.
    pub filtered: bool,
}

impl Breakdown {
    fn of(column: &ByteColumn) -> Self {
        Self {
            entries: column.contributions().collect(),
            filtered: column.is_filtered(),
        }
    }

    /// One line per contributing file. `labels[i]` names file `i`.
    pub fn render(&self, labels: &[String]) -> String {
        let mut out = String::from(if self.filtered {
            "Contributing values (after filtering):"
        } else {
            "Contributing values:"
        });
        for &(file, byte) in &self.entries {
            let label = labels
                .get(file)
                .cloned()
                .unwrap_or_else(|| format!("input #{}", file + 1));
            out.push_str(&format!("\n  - {label}: 0x{byte:02X}"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TieConflict {
    pub tied: Vec<u8>,
    pub count: usize,
    pub breakdown: Breakdown,
}

impl fmt::Display for TieConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.tied.iter().map(|b| format!("0x{b:02X}")).collect();
        write!(
            f,
            "Tie detected for most common byte. Values {} each appeared {} time(s).",
            values.join(", "),
            self.count
        )
    }
}

/// Margin figures reported when a margin was configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginCheck {
    /// `None` when there was no runner-up to measure against.
    pub achieved: Option<f64>,
    pub required: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConflict {
    pub winner: u8,
    pub winner_count: usize,
    pub num_files: usize,
    pub agreement: f64,
    pub threshold: f64,
    pub margin: Option<MarginCheck>,
    pub tally: Tally,
    pub breakdown: Breakdown,
}

impl fmt::Display for ThresholdConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Agreement threshold not met. Most common byte 0x{:02X} appeared in {}/{} files ({}). Required: {}.",
            self.winner,
            self.winner_count,
            self.num_files,
            percent(self.agreement),
            percent(self.threshold),
        )
    }
}

impl VoteError {
    /// Full multi-line diagnostic for a failed vote, naming input files via `labels`.
    pub fn describe(&self, labels: &[String]) -> String {
        match self {
            Self::Tie(tie) => format!("{tie}\n{}", tie.breakdown.render(labels)),
            Self::Threshold(t) => {
                let mut out = t.to_string();
                if let Some(m) = t.margin {
                    match m.achieved {
                        Some(achieved) => out.push_str(&format!(
                            "\nMargin of victory over runner-up was {}. Required: {}.",
                            percent(achieved),
                            percent(m.required)
                        )),
                        None => out.push_str("\nNo runner-up to calculate margin of victory."),
                    }
                }
                out.push_str(&format!(
                    "\nAll options: [ {} ]\n{}",
                    t.tally.describe_votes(),
                    t.breakdown.render(labels)
                ));
                out
            }
            other => other.to_string(),
        }
    }
}

pub(crate) fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// Decide the winning byte of `column`.
///
/// Agreement is measured against `column.num_files()`, so a null-filtered
/// column still needs the same share of all inputs. A tie between the top two
/// candidates always fails, whatever the threshold.
pub fn vote(column: &ByteColumn, config: &RunConfig) -> Result<Resolved, VoteError> {
    let tally = Tally::count(column.values());
    let Some(leader) = tally.leader() else {
        return Err(VoteError::EmptyColumn);
    };

    if tally.is_tied() {
        return Err(VoteError::Tie(TieConflict {
            tied: tally.tied_values(),
            count: leader.count,
            breakdown: Breakdown::of(column),
        }));
    }

    let num_files = column.num_files();
    let agreement = leader.count as f64 / num_files as f64;

    if agreement >= config.threshold {
        return Ok(Resolved {
            byte: leader.byte,
            tally,
            agreement,
            decision: Decision::Threshold,
        });
    }

    // Lead over the runner-up, relative to the runner-up's count.
    let achieved = tally
        .runner_up()
        .filter(|r| r.count > 0)
        .map(|r| (leader.count - r.count) as f64 / r.count as f64);

    if let (Some(required), Some(achieved)) = (config.margin, achieved) {
        if achieved >= required {
            return Ok(Resolved {
                byte: leader.byte,
                tally,
                agreement,
                decision: Decision::Margin,
            });
        }
    }

    Err(VoteError::Threshold(ThresholdConflict {
        winner: leader.byte,
        winner_count: leader.count,
        num_files,
        agreement,
        threshold: config.threshold,
        margin: config.margin.map(|required| MarginCheck { achieved, required }),
        tally,
        breakdown: Breakdown::of(column),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
