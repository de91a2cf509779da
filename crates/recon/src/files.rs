//! File-level run: preconditions, input handles, atomic output.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::driver::Driver;
use crate::error::RunError;
use crate::model::{RunMeta, RunSummary};
use crate::vote::percent;

/// Reconcile `inputs` into `output`.
///
/// All preconditions are checked before anything is written. The output is
/// streamed into a temporary file next to `output` and renamed into place only
/// after every offset has been settled; on any failure the temporary file is
/// removed and `output` is left as it was.
pub fn reconcile_files(
    inputs: &[PathBuf],
    output: &Path,
    driver: &mut Driver<'_>,
) -> Result<RunSummary, RunError> {
    let config = driver.config().clone();
    config.validate()?;

    if inputs.is_empty() {
        return Err(RunError::NoInputs);
    }

    let force = config.output.force;
    let clobbering = output.exists();
    if clobbering && !force {
        return Err(RunError::OutputExists(output.to_path_buf()));
    }

    let file_size = common_size(inputs)?;

    info!("Processing {} files, each of size: {file_size} bytes.", inputs.len());
    info!("Agreement threshold set to {}.", percent(config.threshold));
    if let Some(margin) = config.margin {
        info!("Margin of victory threshold set to {}.", percent(margin));
    }
    if let Some(report) = &config.output.report {
        info!("Discrepancy report will be saved to: {}", report.display());
    }
    if clobbering {
        warn!("Overwriting existing output file '{}'.", output.display());
    } else {
        info!("Output will be written to: {}", output.display());
    }

    let mut files = inputs
        .iter()
        .map(|path| {
            File::open(path).map_err(|source| RunError::Missing {
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    driver.set_labels(inputs.iter().map(|p| label(p)).collect());

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".firmvote-")
        .suffix(".part")
        .tempfile_in(dir)?;

    let (outcome, digest) = {
        let mut writer = DigestWriter::new(BufWriter::new(&mut staged));
        let outcome = match driver.run(&mut files, &mut writer, file_size) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("aborting; partial output discarded");
                return Err(e);
            }
        };
        writer.flush()?;
        (outcome, writer.finish())
    };
    drop(files);

    if outcome.stats.bytes != file_size {
        return Err(RunError::LengthDrift {
            offset: outcome.stats.bytes.min(file_size),
        });
    }

    staged.as_file().sync_all()?;
    let published = if force {
        staged.persist(output)
    } else {
        staged.persist_noclobber(output)
    };
    published.map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            RunError::OutputExists(output.to_path_buf())
        } else {
            RunError::Io(e.error)
        }
    })?;

    info!(
        discrepancies = outcome.stats.discrepancies,
        "Corrected output saved to '{}'",
        output.display()
    );

    Ok(RunSummary {
        meta: RunMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
            output: output.display().to_string(),
            threshold: config.threshold,
            margin: config.margin,
            ignore_nulls: config.ignore_nulls,
            interactive: config.interactive,
        },
        file_size,
        num_files: inputs.len(),
        stats: outcome.stats,
        output_sha256: digest,
        discrepancies: outcome.records,
    })
}

/// Size shared by every input, or the first precondition that fails.
fn common_size(inputs: &[PathBuf]) -> Result<u64, RunError> {
    let mut expected = None;
    for path in inputs {
        let meta = fs::metadata(path).map_err(|source| RunError::Missing {
            path: path.clone(),
            source,
        })?;
        if !meta.is_file() {
            return Err(RunError::Missing {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        match expected {
            None => expected = Some(meta.len()),
            Some(size) if size != meta.len() => {
                return Err(RunError::SizeMismatch {
                    path: path.clone(),
                    expected: size,
                    actual: meta.len(),
                })
            }
            Some(_) => {}
        }
    }
    expected.ok_or(RunError::NoInputs)
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Hashes everything written through it.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
