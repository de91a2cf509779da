//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Description                                                   |
//! |------|---------------------------------------------------------------|
//! | 0    | Success                                                       |
//! | 1    | General error (I/O failure during the run)                    |
//! | 2    | Usage error (bad flag values, unreadable or invalid config)   |
//! | 3    | Precondition failure (no inputs, output exists, missing file, size mismatch) |
//! | 4    | Unresolved vote conflict                                      |
//! | 5    | Output written, discrepancy report could not be written       |
//! | 130  | Interrupted by the operator                                   |

use firmvote_recon::ErrorClass;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - I/O failure while streaming.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments or configuration. Matches clap's own code.
pub const EXIT_USAGE: u8 = 2;

/// Inputs or output path failed validation; nothing was written.
pub const EXIT_PRECONDITION: u8 = 3;

/// An offset could not be decided; the output was discarded.
pub const EXIT_CONFLICT: u8 = 4;

/// The corrected output is in place but the report is missing or partial.
pub const EXIT_REPORT: u8 = 5;

/// Ctrl-C or the operator closed the prompt; the output was discarded.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Map an engine error class to its exit code.
pub fn exit_code_for(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Usage => EXIT_USAGE,
        ErrorClass::Precondition => EXIT_PRECONDITION,
        ErrorClass::Conflict => EXIT_CONFLICT,
        ErrorClass::Interrupted => EXIT_INTERRUPTED,
        ErrorClass::Report => EXIT_REPORT,
        ErrorClass::Io => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_map_to_distinct_codes() {
        let codes = [
            ErrorClass::Usage,
            ErrorClass::Precondition,
            ErrorClass::Conflict,
            ErrorClass::Interrupted,
            ErrorClass::Report,
            ErrorClass::Io,
        ]
        .map(exit_code_for);
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, EXIT_SUCCESS);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
