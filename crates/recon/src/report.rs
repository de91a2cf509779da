//! Discrepancy log and its CSV form.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::column::ByteColumn;
use crate::error::RunError;
use crate::tally::Tally;
use crate::vote::{Decision, Resolved};

/// One offset where the inputs disagreed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancyRecord {
    pub offset: u64,
    pub winner: u8,
    /// Inputs holding the winning byte, counted on the unfiltered column.
    pub winner_count: usize,
    pub num_files: usize,
    /// Ranking of the unfiltered column.
    pub votes: Tally,
    pub decision: Decision,
}

impl DiscrepancyRecord {
    pub fn new(offset: u64, column: &ByteColumn, resolved: &Resolved) -> Self {
        let votes = Tally::count(column.values());
        Self {
            offset,
            winner: resolved.byte,
            winner_count: votes.count_of(resolved.byte),
            num_files: column.num_files(),
            votes,
            decision: resolved.decision,
        }
    }

    pub fn agreement(&self) -> f64 {
        self.winner_count as f64 / self.num_files as f64
    }
}

/// A CSV row, all fields pre-rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub offset: String,
    pub winning_byte: String,
    pub agreement: String,
    pub all_votes: String,
    pub decision: &'static str,
}

impl From<&DiscrepancyRecord> for ReportRow {
    fn from(r: &DiscrepancyRecord) -> Self {
        Self {
            offset: format!("0x{:X}", r.offset),
            winning_byte: format!("0x{:02X}", r.winner),
            agreement: format!("{}/{}", r.winner_count, r.num_files),
            all_votes: r.votes.to_string(),
            decision: r.decision.as_str(),
        }
    }
}

const HEADERS: [&str; 5] = ["offset", "winning_byte", "agreement", "all_votes", "decision"];

/// Write the report as CSV. The header is always written.
pub fn write_csv<W: Write>(records: &[DiscrepancyRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(HEADERS)?;
    for record in records {
        wtr.serialize(ReportRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_report_file(path: &Path, records: &[DiscrepancyRecord]) -> Result<(), RunError> {
    let report_err = |message: String| RunError::Report {
        path: path.to_path_buf(),
        message,
    };
    let file = File::create(path).map_err(|e| report_err(e.to_string()))?;
    write_csv(records, file).map_err(|e| report_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::vote::vote;

    fn record(offset: u64, values: Vec<u8>) -> DiscrepancyRecord {
        let column = ByteColumn::new(values);
        let resolved = vote(&column, &RunConfig::default()).unwrap();
        DiscrepancyRecord::new(offset, &column, &resolved)
    }

    #[test]
    fn record_uses_unfiltered_counts() {
        let column = ByteColumn::new(vec![0xAA, 0xAA, 0x00, 0x00, 0xAA]);
        let resolved = Resolved {
            byte: 0xAA,
            tally: Tally::count(&[0xAA, 0xAA, 0xAA]),
            agreement: 0.6,
            decision: Decision::NullRetry,
        };
        let r = DiscrepancyRecord::new(7, &column, &resolved);
        assert_eq!(r.winner_count, 3);
        assert_eq!(r.num_files, 5);
        assert_eq!(r.votes.count_of(0x00), 2);
        assert_eq!(r.agreement(), 0.6);
    }

    #[test]
    fn csv_layout() {
        let records = vec![
            record(0x1F, vec![0xAA, 0xAA, 0xAA, 0x0B]),
            record(0x100, vec![0x01, 0x02, 0x02]),
        ];
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "offset,winning_byte,agreement,all_votes,decision");
        assert_eq!(lines[1], "0x1F,0xAA,3/4,\"0xAA(3), 0x0B(1)\",threshold");
        assert_eq!(lines[2], "0x100,0x02,2/3,\"0x02(2), 0x01(1)\",threshold");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_report_still_has_header() {
        let mut buf = Vec::new();
        write_csv(&[], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "offset,winning_byte,agreement,all_votes,decision\n");
    }
}
