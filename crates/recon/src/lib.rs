//! `firmvote-recon`: byte-level majority-vote reconciliation engine.
//!
//! Takes N equally sized dumps of the same image and produces one corrected
//! image by voting at every offset. No CLI dependencies; operator input comes
//! in through the [`prompt::Tiebreaker`] trait.

pub mod column;
pub mod config;
pub mod driver;
pub mod error;
pub mod files;
pub mod model;
pub mod prompt;
pub mod report;
pub mod tally;
pub mod vote;

pub use column::ByteColumn;
pub use config::RunConfig;
pub use driver::{Driver, Progress};
pub use error::{ErrorClass, RunError, VoteError};
pub use files::reconcile_files;
pub use model::{Outcome, RunStats, RunSummary};
pub use prompt::{ConsolePrompt, PromptRequest, Scripted, Tiebreaker};
pub use report::{write_report_file, DiscrepancyRecord};
pub use tally::{Candidate, Tally};
pub use vote::{vote, Decision, Resolved};
