//! Streams aligned inputs offset by offset and settles every discrepancy.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::column::ByteColumn;
use crate::config::RunConfig;
use crate::error::{RunError, VoteError};
use crate::model::{Outcome, RunStats};
use crate::prompt::{PromptRequest, Tiebreaker};
use crate::report::DiscrepancyRecord;
use crate::tally::Tally;
use crate::vote::{percent, vote, Decision, Resolved};

/// Bytes committed so far out of the expected total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }
}

pub struct Driver<'a> {
    config: &'a RunConfig,
    labels: Vec<String>,
    tiebreaker: Option<&'a mut dyn Tiebreaker>,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<Box<dyn FnMut(Progress) + 'a>>,
}

impl<'a> Driver<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            labels: Vec::new(),
            tiebreaker: None,
            cancel: None,
            progress: None,
        }
    }

    /// Names used for input files in diagnostics, by file index.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Operator consulted when `config.interactive` is set.
    pub fn with_tiebreaker(mut self, tiebreaker: &'a mut dyn Tiebreaker) -> Self {
        self.tiebreaker = Some(tiebreaker);
        self
    }

    /// Flag polled before every offset; once set the run stops as interrupted.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Called after each chunk is committed.
    pub fn with_progress(mut self, f: impl FnMut(Progress) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub(crate) fn set_labels(&mut self, labels: Vec<String>) {
        self.labels = labels;
    }

    fn check_cancel(&self, offset: u64) -> Result<(), RunError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(RunError::Interrupted { offset }),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Escalation
    // -----------------------------------------------------------------------

    /// Settle a column whose inputs disagree.
    ///
    /// Order: plain vote, then one vote with 0x00 bytes removed (when
    /// `ignore_nulls`), then the operator (when `interactive`). Whatever is
    /// still unresolved is fatal for the run.
    pub fn resolve(&mut self, offset: u64, column: &ByteColumn) -> Result<Resolved, RunError> {
        let first = match vote(column, self.config) {
            Ok(resolved) => {
                if resolved.decision == Decision::Margin {
                    warn!(
                        "offset 0x{offset:X}: absolute threshold not met, but margin of victory is sufficient"
                    );
                }
                return Ok(resolved);
            }
            Err(VoteError::EmptyColumn) => {
                return Err(RunError::Conflict {
                    offset,
                    detail: VoteError::EmptyColumn.to_string(),
                    source: VoteError::EmptyColumn,
                })
            }
            Err(e) => e,
        };

        let failure = if self.config.ignore_nulls && column.has_nulls() {
            warn!("offset 0x{offset:X}: vote failed; ignoring 0x00 bytes and re-evaluating");
            let filtered = column.without_nulls();
            if filtered.is_empty() {
                VoteError::AllNull
            } else {
                // Terminal: the retry's outcome replaces the first failure.
                match vote(&filtered, self.config) {
                    Ok(mut resolved) => {
                        resolved.decision = Decision::NullRetry;
                        return Ok(resolved);
                    }
                    Err(e) => e,
                }
            }
        } else {
            first
        };

        let detail = failure.describe(&self.labels);

        if self.config.interactive {
            if let Some(tiebreaker) = self.tiebreaker.as_mut() {
                // The operator always sees the unfiltered column.
                let tally = Tally::count(column.values());
                let request = PromptRequest {
                    offset,
                    detail: &detail,
                    candidates: tally.candidates(),
                };
                let byte = match tiebreaker.choose(&request) {
                    Ok(byte) => byte,
                    Err(VoteError::Interrupted) => return Err(RunError::Interrupted { offset }),
                    Err(e) => {
                        return Err(RunError::Conflict {
                            offset,
                            detail: e.to_string(),
                            source: e,
                        })
                    }
                };
                self.check_cancel(offset)?;
                let agreement = tally.count_of(byte) as f64 / column.num_files() as f64;
                return Ok(Resolved {
                    byte,
                    tally,
                    agreement,
                    decision: Decision::Operator,
                });
            }
            warn!("interactive mode requested but no operator prompt is attached");
        }

        Err(RunError::Conflict {
            offset,
            detail,
            source: failure,
        })
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Read every input in lockstep, `chunk_size` bytes at a time, and write
    /// the reconciled stream to `output`.
    ///
    /// `total` only feeds progress reporting; the loop runs until the inputs
    /// are exhausted. Inputs that run out at different points abort the run.
    pub fn run<R: Read, W: Write>(
        &mut self,
        inputs: &mut [R],
        output: &mut W,
        total: u64,
    ) -> Result<Outcome, RunError> {
        if inputs.is_empty() {
            return Err(RunError::NoInputs);
        }

        // Never buffer more than the inputs hold; chunk_size is only a cap.
        let expected = usize::try_from(total).unwrap_or(usize::MAX).max(1);
        let chunk_size = self.config.chunk_size.min(expected);
        let mut buffers = vec![vec![0u8; chunk_size]; inputs.len()];
        let mut out_chunk = Vec::with_capacity(chunk_size);
        let mut stats = RunStats::default();
        let mut records = Vec::new();
        let mut processed: u64 = 0;

        loop {
            let mut len = None;
            for (buf, input) in buffers.iter_mut().zip(inputs.iter_mut()) {
                let n = read_chunk(input, buf)?;
                match len {
                    None => len = Some(n),
                    Some(expected) if expected != n => {
                        return Err(RunError::LengthDrift {
                            offset: processed + expected.min(n) as u64,
                        })
                    }
                    Some(_) => {}
                }
            }
            let len = len.unwrap_or(0);
            if len == 0 {
                break;
            }

            out_chunk.clear();
            for i in 0..len {
                let offset = processed + i as u64;
                self.check_cancel(offset)?;

                let first = buffers[0][i];
                if buffers.iter().all(|b| b[i] == first) {
                    out_chunk.push(first);
                    continue;
                }

                let column = ByteColumn::new(buffers.iter().map(|b| b[i]).collect());
                let resolved = self.resolve(offset, &column)?;
                let record = DiscrepancyRecord::new(offset, &column, &resolved);

                // The prompt already narrated interactive offsets.
                if self.config.verbose && !self.config.interactive {
                    info!(
                        "discrepancy at offset 0x{offset:X}: winning byte is 0x{:02X} ({}, {}). Options: [ {} ]",
                        resolved.byte,
                        percent(record.agreement()),
                        resolved.decision,
                        record.votes.describe_votes(),
                    );
                }

                stats.record(resolved.decision);
                records.push(record);
                out_chunk.push(resolved.byte);
            }

            output.write_all(&out_chunk)?;
            processed += len as u64;
            debug!(processed, total, "chunk committed");
            if let Some(progress) = self.progress.as_mut() {
                progress(Progress { processed, total });
            }
        }

        output.flush()?;
        stats.bytes = processed;
        Ok(Outcome { stats, records })
    }
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Scripted;
    use std::io::Cursor;

    fn inputs(files: &[&[u8]]) -> Vec<Cursor<Vec<u8>>> {
        files.iter().map(|f| Cursor::new(f.to_vec())).collect()
    }

    fn run(config: &RunConfig, files: &[&[u8]]) -> Result<(Vec<u8>, Outcome), RunError> {
        let mut ins = inputs(files);
        let mut out = Vec::new();
        let outcome = Driver::new(config).run(&mut ins, &mut out, files[0].len() as u64)?;
        Ok((out, outcome))
    }

    fn small_chunks() -> RunConfig {
        RunConfig {
            chunk_size: 3,
            ..RunConfig::default()
        }
    }

    #[test]
    fn identical_inputs_copy_through_without_records() {
        let data: &[u8] = b"firmware image v1.0";
        let (out, outcome) = run(&small_chunks(), &[data, data, data]).unwrap();
        assert_eq!(out, data);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.stats.discrepancies, 0);
        assert_eq!(outcome.stats.bytes, data.len() as u64);
    }

    #[test]
    fn majority_wins_across_chunk_boundaries() {
        let a: &[u8] = &[1, 2, 3, 4, 5, 6, 7];
        let b: &[u8] = &[1, 2, 3, 4, 5, 6, 7];
        let c: &[u8] = &[1, 2, 3, 9, 5, 6, 7];
        let d: &[u8] = &[1, 2, 3, 4, 5, 6, 8];
        let (out, outcome) = run(&small_chunks(), &[a, b, c, d]).unwrap();
        assert_eq!(out, a);
        let offsets: Vec<u64> = outcome.records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![3, 6]);
        assert_eq!(outcome.records[0].winner_count, 3);
        assert_eq!(outcome.stats.by_threshold, 2);
    }

    #[test]
    fn tie_aborts_with_offset() {
        let a: &[u8] = &[0, 0xAA, 0];
        let b: &[u8] = &[0, 0xBB, 0];
        let err = run(&RunConfig::default(), &[a, b]).unwrap_err();
        match err {
            RunError::Conflict { offset, source: VoteError::Tie(_), detail } => {
                assert_eq!(offset, 1);
                assert!(detail.contains("Tie detected"));
            }
            other => panic!("expected tie conflict, got {other:?}"),
        }
    }

    #[test]
    fn null_retry_resolves_when_threshold_allows() {
        let config = RunConfig {
            threshold: 0.5,
            ignore_nulls: true,
            ..RunConfig::default()
        };
        // [AA, AA, 00, 00] ties first; without nulls 2/4 = 0.5 passes.
        let (out, outcome) = run(&config, &[&[0xAA], &[0xAA], &[0x00], &[0x00]]).unwrap();
        assert_eq!(out, vec![0xAA]);
        assert_eq!(outcome.records[0].decision, Decision::NullRetry);
        assert_eq!(outcome.stats.by_null_retry, 1);
        assert_eq!(outcome.records[0].votes.count_of(0x00), 2);
    }

    #[test]
    fn null_retry_is_terminal() {
        let config = RunConfig {
            threshold: 0.9,
            ignore_nulls: true,
            ..RunConfig::default()
        };
        let err = run(&config, &[&[0xAA], &[0xAA], &[0x00], &[0x00]]).unwrap_err();
        match err {
            RunError::Conflict { source: VoteError::Threshold(t), .. } => {
                assert_eq!(t.agreement, 0.5);
                assert!(t.breakdown.filtered);
                assert_eq!(t.breakdown.entries, vec![(0, 0xAA), (1, 0xAA)]);
            }
            other => panic!("expected threshold conflict, got {other:?}"),
        }
    }

    #[test]
    fn null_retry_needs_a_null_to_run() {
        let config = RunConfig {
            ignore_nulls: true,
            ..RunConfig::default()
        };
        let err = run(&config, &[&[0x01], &[0x02]]).unwrap_err();
        assert!(matches!(err, RunError::Conflict { source: VoteError::Tie(_), .. }));
    }

    #[test]
    fn operator_resolves_after_failed_retry_from_unfiltered_list() {
        let config = RunConfig {
            threshold: 0.9,
            ignore_nulls: true,
            interactive: true,
            ..RunConfig::default()
        };
        let mut files = inputs(&[&[0xAA], &[0xAA], &[0x00], &[0x00]]);
        let mut out = Vec::new();
        // The unfiltered ranking is [AA(2), 00(2)]; choice 2 picks the null.
        let mut operator = Scripted::new([2]);
        let outcome = Driver::new(&config)
            .with_tiebreaker(&mut operator)
            .run(&mut files, &mut out, 1)
            .unwrap();
        assert_eq!(out, vec![0x00]);
        assert_eq!(outcome.records[0].decision, Decision::Operator);
        assert_eq!(outcome.stats.by_operator, 1);
        assert_eq!(operator.asked(), &[0]);
    }

    #[test]
    fn operator_sees_all_null_conflicts() {
        let config = RunConfig {
            ignore_nulls: true,
            interactive: true,
            ..RunConfig::default()
        };
        let column = ByteColumn::new(vec![0x00, 0x00, 0x00]);
        let mut operator = Scripted::new([1]);
        let resolved = Driver::new(&config)
            .with_tiebreaker(&mut operator)
            .resolve(5, &column)
            .unwrap();
        assert_eq!(resolved.byte, 0x00);
        assert_eq!(resolved.decision, Decision::Operator);
    }

    #[test]
    fn all_null_is_fatal_without_operator() {
        let config = RunConfig {
            ignore_nulls: true,
            ..RunConfig::default()
        };
        let column = ByteColumn::new(vec![0x00, 0x00]);
        let err = Driver::new(&config).resolve(9, &column).unwrap_err();
        assert!(matches!(err, RunError::Conflict { offset: 9, source: VoteError::AllNull, .. }));
    }

    #[test]
    fn operator_hanging_up_interrupts() {
        let config = RunConfig {
            interactive: true,
            ..RunConfig::default()
        };
        let mut operator = Scripted::new([]);
        let mut files = inputs(&[&[1, 1], &[1, 2]]);
        let mut out = Vec::new();
        let err = Driver::new(&config)
            .with_tiebreaker(&mut operator)
            .run(&mut files, &mut out, 2)
            .unwrap_err();
        assert!(matches!(err, RunError::Interrupted { offset: 1 }));
    }

    #[test]
    fn interactive_without_prompt_is_fatal() {
        let config = RunConfig {
            interactive: true,
            ..RunConfig::default()
        };
        let err = run(&config, &[&[1], &[2]]).unwrap_err();
        assert!(matches!(err, RunError::Conflict { .. }));
    }

    #[test]
    fn unanimous_offsets_never_reach_the_prompt() {
        let config = RunConfig {
            interactive: true,
            ..RunConfig::default()
        };
        let mut operator = Scripted::new([]);
        let mut files = inputs(&[b"same", b"same"]);
        let mut out = Vec::new();
        Driver::new(&config)
            .with_tiebreaker(&mut operator)
            .run(&mut files, &mut out, 4)
            .unwrap();
        assert!(operator.asked().is_empty());
    }

    #[test]
    fn cancel_flag_stops_before_next_offset() {
        let flag = Arc::new(AtomicBool::new(true));
        let config = RunConfig::default();
        let mut files = inputs(&[b"abc", b"abc"]);
        let mut out = Vec::new();
        let err = Driver::new(&config)
            .with_cancel(flag)
            .run(&mut files, &mut out, 3)
            .unwrap_err();
        assert!(matches!(err, RunError::Interrupted { offset: 0 }));
        assert!(out.is_empty());
    }

    #[test]
    fn uneven_inputs_are_rejected() {
        let err = run(&small_chunks(), &[b"abcd", b"abc"]).unwrap_err();
        assert!(matches!(err, RunError::LengthDrift { offset: 3 }));
    }

    #[test]
    fn progress_reports_each_chunk() {
        let config = small_chunks();
        let mut seen = Vec::new();
        let mut files = inputs(&[b"1234567", b"1234567"]);
        let mut out = Vec::new();
        Driver::new(&config)
            .with_progress(|p| seen.push((p.processed, p.total)))
            .run(&mut files, &mut out, 7)
            .unwrap();
        assert_eq!(seen, vec![(3, 7), (6, 7), (7, 7)]);
    }

    #[test]
    fn oversized_chunk_is_capped_at_the_input_length() {
        let config = RunConfig {
            chunk_size: usize::MAX,
            ..RunConfig::default()
        };
        config.validate().unwrap();
        let (out, outcome) = run(&config, &[b"\x01\x02\x03", b"\x01\x02\x03", b"\x01\xFF\x03"]).unwrap();
        assert_eq!(out, b"\x01\x02\x03");
        assert_eq!(outcome.stats.discrepancies, 1);
    }

    #[test]
    fn understated_total_still_reads_everything() {
        let config = RunConfig {
            chunk_size: 1 << 20,
            ..RunConfig::default()
        };
        let mut files = inputs(&[b"abcdef", b"abcdef"]);
        let mut out = Vec::new();
        let outcome = Driver::new(&config).run(&mut files, &mut out, 2).unwrap();
        assert_eq!(out, b"abcdef");
        assert_eq!(outcome.stats.bytes, 6);
    }

    #[test]
    fn verbose_changes_neither_output_nor_records() {
        let a: &[u8] = &[1, 2, 3, 4, 5, 6, 7];
        let b: &[u8] = &[1, 2, 3, 4, 5, 6, 7];
        let c: &[u8] = &[1, 9, 3, 4, 5, 0, 7];
        let quiet = run(&small_chunks(), &[a, b, c]).unwrap();
        for interactive in [false, true] {
            let config = RunConfig {
                verbose: true,
                interactive,
                ..small_chunks()
            };
            let mut prompt = Scripted::new([]);
            let mut files = inputs(&[a, b, c]);
            let mut out = Vec::new();
            let outcome = Driver::new(&config)
                .with_tiebreaker(&mut prompt)
                .run(&mut files, &mut out, 7)
                .unwrap();
            assert_eq!(out, quiet.0);
            assert_eq!(outcome, quiet.1);
            // Every column passed the threshold, so the operator was never asked.
            assert!(prompt.asked().is_empty());
        }
    }

    #[test]
    fn empty_inputs_produce_empty_output() {
        let (out, outcome) = run(&RunConfig::default(), &[b"", b""]).unwrap();
        assert!(out.is_empty());
        assert_eq!(outcome.stats.bytes, 0);
    }

    #[test]
    fn no_inputs_is_rejected() {
        let mut files: Vec<Cursor<Vec<u8>>> = Vec::new();
        let mut out = Vec::new();
        let err = Driver::new(&RunConfig::default()).run(&mut files, &mut out, 0).unwrap_err();
        assert!(matches!(err, RunError::NoInputs));
    }
}
