// firmvote CLI - rebuild one firmware image from several noisy dumps
// by majority vote at every byte offset.

mod exit_codes;
mod interrupt;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use firmvote_recon::{
    reconcile_files, write_report_file, ConsolePrompt, Driver, RunConfig, RunError, RunSummary,
};

use exit_codes::{exit_code_for, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use interrupt::CancellableInput;

#[derive(Parser)]
#[command(name = "firmvote")]
#[command(
    about = "Corrects firmware dumps by finding the most common byte at each position from multiple source files"
)]
#[command(version)]
#[command(after_help = "\
Examples:
  firmvote -o corrected.bin dump1.bin dump2.bin dump3.bin
  firmvote -i --margin 0.5 -o corrected.bin dump*.bin
  firmvote --ignore-nulls --report diffs.csv -o corrected.bin dump*.bin
  firmvote --config vote.toml --json -o corrected.bin dump*.bin")]
struct Cli {
    /// One or more input .bin firmware files to process
    #[arg(required = true)]
    input_files: Vec<PathBuf>,

    /// Path for the corrected output file
    #[arg(long, short = 'o', default_value = "firmware_corrected.bin")]
    output: PathBuf,

    /// Minimum fraction of all files that must agree on a byte [default: 0.65]
    #[arg(long, short = 't')]
    threshold: Option<f64>,

    /// If the threshold fails, accept a winner leading the runner-up by this fraction (e.g. 0.5 for 50%)
    #[arg(long)]
    margin: Option<f64>,

    /// On conflict, prompt for a manual byte selection instead of exiting
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Print detailed information for each byte with a discrepancy
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Overwrite the output file if it exists
    #[arg(long, short = 'f')]
    force: bool,

    /// Write a CSV report of all discrepancies
    #[arg(long)]
    report: Option<PathBuf>,

    /// Bytes to read from each file at a time [default: 8192]
    #[arg(long)]
    chunk_size: Option<usize>,

    /// If a vote fails, retry after excluding 0x00 bytes from the candidates
    #[arg(long)]
    ignore_nulls: bool,

    /// TOML file with default settings; flags given here take precedence
    #[arg(long, short = 'c', env = "FIRMVOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Suppress progress and the human summary
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cmd_vote(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        let hint = match &err {
            RunError::OutputExists(_) => Some("use --force to overwrite".to_string()),
            RunError::Conflict { .. } => Some(
                "lower --threshold, set --margin, try --ignore-nulls, or resolve by hand with --interactive"
                    .to_string(),
            ),
            _ => None,
        };
        Self { code: exit_code_for(err.class()), message: err.to_string(), hint }
    }
}

// ============================================================================
// config
// ============================================================================

/// Config file (if any) overlaid with command-line flags.
fn build_config(cli: &Cli) -> Result<RunConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::usage(format!("cannot read config {}: {e}", path.display()))
            })?;
            RunConfig::from_toml(&text).map_err(|e| CliError::usage(e.to_string()))?
        }
        None => RunConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(margin) = cli.margin {
        config.margin = Some(margin);
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.interactive |= cli.interactive;
    config.verbose |= cli.verbose;
    config.ignore_nulls |= cli.ignore_nulls;
    config.output.force |= cli.force;
    if cli.report.is_some() {
        config.output.report = cli.report.clone();
    }

    config.validate().map_err(|e| CliError::usage(e.to_string()))?;
    Ok(config)
}

// ============================================================================
// vote
// ============================================================================

fn cmd_vote(cli: Cli) -> Result<(), CliError> {
    let config = build_config(&cli)?;

    let cancel = interrupt::install().unwrap_or_else(|e| {
        warn!("cannot listen for Ctrl-C ({e}); interrupting will not clean up");
        Arc::new(AtomicBool::new(false))
    });
    let mut prompt = if config.interactive {
        let input = CancellableInput::stdin(Arc::clone(&cancel))
            .map_err(|e| CliError::io(format!("cannot read from stdin: {e}")))?;
        Some(ConsolePrompt::new(input, io::stderr()))
    } else {
        None
    };

    let mut driver = Driver::new(&config).with_cancel(cancel);

    let show_progress = !cli.quiet && io::stderr().is_terminal();
    if show_progress {
        driver = driver.with_progress(|p| {
            eprint!("\rProcessed {}/{} bytes ({:.2}%)", p.processed, p.total, p.percent());
        });
    }

    if let Some(prompt) = prompt.as_mut() {
        driver = driver.with_tiebreaker(prompt);
    }

    let result = reconcile_files(&cli.input_files, &cli.output, &mut driver);
    drop(driver);
    if show_progress {
        eprintln!();
    }
    let summary = result?;

    let report_result = match &config.output.report {
        Some(path) => write_report_file(path, &summary.discrepancies).map(|()| Some(path)),
        None => Ok(None),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    if !cli.quiet {
        if let Ok(Some(path)) = &report_result {
            eprintln!("Discrepancy report saved to '{}'.", path.display());
        }
        print_summary(&summary);
    }

    report_result.map_err(|e| {
        CliError::from(e).with_hint(format!(
            "the corrected output at '{}' is complete",
            cli.output.display()
        ))
    })?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let s = &summary.stats;
    eprintln!("Processing complete.");
    eprintln!("Total bytes with disagreements: {}", s.discrepancies);
    if s.discrepancies > 0 {
        eprintln!(
            "  resolved by threshold: {}, margin: {}, null retry: {}, operator: {}",
            s.by_threshold, s.by_margin, s.by_null_retry, s.by_operator
        );
    }
    eprintln!("Corrected firmware saved to '{}'", summary.meta.output);
}
