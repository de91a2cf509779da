use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::vote::{ThresholdConflict, TieConflict};

/// Failure to decide a single column.
#[derive(Debug, Error)]
pub enum VoteError {
    /// The column had no bytes in it. Callers never produce one.
    #[error("cannot vote on an empty column")]
    EmptyColumn,
    /// The two best-ranked candidates have the same count.
    #[error("{0}")]
    Tie(TieConflict),
    /// Neither the agreement threshold nor the margin fallback was met.
    #[error("{0}")]
    Threshold(ThresholdConflict),
    /// Every byte was 0x00 and nulls were being ignored.
    #[error("vote failed because only 0x00 bytes were present and were ignored")]
    AllNull,
    /// The operator closed the prompt without choosing.
    #[error("operator ended conflict resolution without a choice")]
    Interrupted,
    /// Reading or writing the prompt stream failed.
    #[error("prompt I/O error: {0}")]
    Prompt(#[from] io::Error),
}

/// Failure of a whole reconciliation run.
#[derive(Debug, Error)]
pub enum RunError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// A setting is out of range.
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    #[error("no input files provided")]
    NoInputs,
    #[error("output file '{}' already exists", .0.display())]
    OutputExists(PathBuf),
    #[error("cannot read '{}': {source}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "file '{}' has a different size ({actual} bytes, expected {expected}); all files must be the same length",
        path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    /// Inputs stopped agreeing on length after validation (a file changed mid-run).
    #[error("input lengths diverged at offset 0x{offset:X}; files changed while being read")]
    LengthDrift { offset: u64 },
    /// An offset could not be decided and nothing else could resolve it.
    #[error("error at offset 0x{offset:X}: {detail}")]
    Conflict {
        offset: u64,
        detail: String,
        #[source]
        source: VoteError,
    },
    #[error("process interrupted by user at offset 0x{offset:X}")]
    Interrupted { offset: u64 },
    #[error("cannot write report '{}': {message}", path.display())]
    Report { path: PathBuf, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse grouping of run failures, used for exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Usage,
    Precondition,
    Conflict,
    Interrupted,
    Report,
    Io,
}

impl RunError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigParse(_) | Self::ConfigValidation(_) => ErrorClass::Usage,
            Self::NoInputs
            | Self::OutputExists(_)
            | Self::Missing { .. }
            | Self::SizeMismatch { .. }
            | Self::LengthDrift { .. } => ErrorClass::Precondition,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Interrupted { .. } => ErrorClass::Interrupted,
            Self::Report { .. } => ErrorClass::Report,
            Self::Io(_) => ErrorClass::Io,
        }
    }
}
