//! Operator tiebreaking.
//!
//! The driver only sees the [`Tiebreaker`] trait. The console implementation
//! is generic over its streams so it can be driven from tests, and
//! [`Scripted`] replays canned answers.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::error::VoteError;
use crate::tally::Candidate;

/// What the operator is asked to decide.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub offset: u64,
    /// Diagnostics of the failed vote.
    pub detail: &'a str,
    /// Ranked candidates of the unfiltered column, presented as 1-based choices.
    pub candidates: &'a [Candidate],
}

pub trait Tiebreaker {
    /// Return the byte to write at `request.offset`.
    ///
    /// `VoteError::Interrupted` means the operator gave up.
    fn choose(&mut self, request: &PromptRequest<'_>) -> Result<u8, VoteError>;
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: BufRead, W: Write> Tiebreaker for ConsolePrompt<R, W> {
    fn choose(&mut self, request: &PromptRequest<'_>) -> Result<u8, VoteError> {
        let candidates = request.candidates;
        if candidates.is_empty() {
            return Err(VoteError::EmptyColumn);
        }

        writeln!(self.output, "\nError at offset 0x{:X}: {}", request.offset, request.detail)?;
        writeln!(self.output, "--- Interactive Conflict Resolution ---")?;
        writeln!(self.output, "Please select the byte to write:")?;
        for (i, c) in candidates.iter().enumerate() {
            writeln!(self.output, "  {}) 0x{:02X} ({} votes)", i + 1, c.byte, c.count)?;
        }

        let mut line = String::new();
        loop {
            write!(self.output, "Enter choice (1-{}): ", candidates.len())?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(VoteError::Interrupted);
            }

            match line.trim().parse::<usize>() {
                Ok(n) if (1..=candidates.len()).contains(&n) => {
                    let byte = candidates[n - 1].byte;
                    writeln!(
                        self.output,
                        "User selected 0x{byte:02X} for offset 0x{:X}.",
                        request.offset
                    )?;
                    return Ok(byte);
                }
                Ok(_) => writeln!(self.output, "Invalid choice. Please try again.")?,
                Err(_) => writeln!(
                    self.output,
                    "Invalid input. Please enter a number from the list."
                )?,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// Answers prompts from a fixed list of 1-based choices.
///
/// Out-of-range answers are skipped like a re-prompt; running out of answers
/// behaves like the operator hanging up.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    answers: VecDeque<usize>,
    asked: Vec<u64>,
}

impl Scripted {
    pub fn new(answers: impl IntoIterator<Item = usize>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Offsets that were brought to the prompt, in order.
    pub fn asked(&self) -> &[u64] {
        &self.asked
    }
}

impl Tiebreaker for Scripted {
    fn choose(&mut self, request: &PromptRequest<'_>) -> Result<u8, VoteError> {
        self.asked.push(request.offset);
        while let Some(n) = self.answers.pop_front() {
            if (1..=request.candidates.len()).contains(&n) {
                return Ok(request.candidates[n - 1].byte);
            }
        }
        Err(VoteError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { byte: 0xAA, count: 2 },
            Candidate { byte: 0xBB, count: 2 },
        ]
    }

    fn ask(input: &str) -> (Result<u8, VoteError>, String) {
        let cands = candidates();
        let request = PromptRequest {
            offset: 0x10,
            detail: "Tie detected",
            candidates: &cands,
        };
        let mut prompt = ConsolePrompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
        let result = prompt.choose(&request);
        let (_, out) = prompt.into_inner();
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn valid_choice_is_one_based() {
        let (result, out) = ask("2\n");
        assert_eq!(result.unwrap(), 0xBB);
        assert!(out.contains("Error at offset 0x10: Tie detected"));
        assert!(out.contains("  1) 0xAA (2 votes)"));
        assert!(out.contains("  2) 0xBB (2 votes)"));
        assert!(out.contains("User selected 0xBB for offset 0x10."));
    }

    #[test]
    fn reprompts_until_valid() {
        let (result, out) = ask("abc\n0\n3\n  1  \n");
        assert_eq!(result.unwrap(), 0xAA);
        assert_eq!(out.matches("Enter choice (1-2): ").count(), 4);
        assert_eq!(out.matches("Invalid choice. Please try again.").count(), 2);
        assert_eq!(
            out.matches("Invalid input. Please enter a number from the list.").count(),
            1
        );
    }

    #[test]
    fn end_of_input_is_an_interrupt() {
        let (result, _) = ask("7\n");
        assert!(matches!(result, Err(VoteError::Interrupted)));
    }

    #[test]
    fn scripted_skips_out_of_range_answers() {
        let cands = candidates();
        let request = PromptRequest {
            offset: 3,
            detail: "",
            candidates: &cands,
        };
        let mut s = Scripted::new([9, 2]);
        assert_eq!(s.choose(&request).unwrap(), 0xBB);
        assert!(matches!(s.choose(&request), Err(VoteError::Interrupted)));
        assert_eq!(s.asked(), &[3, 3]);
    }
}
