use std::fmt;

use serde::Serialize;

/// One distinct byte value and how many inputs voted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub byte: u8,
    pub count: usize,
}

/// Candidates ranked by count, highest first.
///
/// Equal counts keep the order in which the values were first seen, so the
/// same column always produces the same ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tally {
    candidates: Vec<Candidate>,
}

impl Tally {
    pub fn count(values: &[u8]) -> Self {
        let mut counts = [0usize; 256];
        let mut seen = Vec::new();
        for &b in values {
            if counts[b as usize] == 0 {
                seen.push(b);
            }
            counts[b as usize] += 1;
        }

        let mut candidates: Vec<Candidate> = seen
            .into_iter()
            .map(|byte| Candidate {
                byte,
                count: counts[byte as usize],
            })
            .collect();
        // sort_by is stable: first-seen order survives among equal counts
        candidates.sort_by(|a, b| b.count.cmp(&a.count));

        Self { candidates }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn leader(&self) -> Option<Candidate> {
        self.candidates.first().copied()
    }

    pub fn runner_up(&self) -> Option<Candidate> {
        self.candidates.get(1).copied()
    }

    /// True when the two best candidates have the same count.
    pub fn is_tied(&self) -> bool {
        match (self.leader(), self.runner_up()) {
            (Some(a), Some(b)) => a.count == b.count,
            _ => false,
        }
    }

    /// Every value sharing the leader's count.
    pub fn tied_values(&self) -> Vec<u8> {
        let Some(leader) = self.leader() else {
            return Vec::new();
        };
        self.candidates
            .iter()
            .take_while(|c| c.count == leader.count)
            .map(|c| c.byte)
            .collect()
    }

    pub fn count_of(&self, byte: u8) -> usize {
        self.candidates
            .iter()
            .find(|c| c.byte == byte)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    /// `0xAA (3 votes), 0xBB (1 votes)` as shown in diagnostics.
    pub fn describe_votes(&self) -> String {
        self.candidates
            .iter()
            .map(|c| format!("0x{:02X} ({} votes)", c.byte, c.count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Compact report form: `0xAA(3), 0xBB(1)`.
impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.candidates.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "0x{:02X}({})", c.byte, c.count)?;
        }
        Ok(())
    }
}
