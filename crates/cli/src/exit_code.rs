//! Process exit codes
//!
//! Every failed operation exits with 1. Input that cannot be understood
//! (malformed JSON on stdin, contradictory global settings) exits with 2,
//! matching clap's own usage errors.

/// Exit code returned by the `isd_s3` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every command succeeded
    Success = 0,
    /// A command failed, or no command was given
    GeneralError = 1,
    /// The input could not be parsed
    UsageError = 2,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Combine the outcomes of several commands; any failure wins
    pub fn and(self, other: ExitCode) -> ExitCode {
        if self == ExitCode::Success {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
    }

    #[test]
    fn test_and_keeps_first_failure() {
        assert_eq!(ExitCode::Success.and(ExitCode::Success), ExitCode::Success);
        assert_eq!(
            ExitCode::Success.and(ExitCode::GeneralError),
            ExitCode::GeneralError
        );
        assert_eq!(
            ExitCode::UsageError.and(ExitCode::GeneralError),
            ExitCode::UsageError
        );
    }
}
