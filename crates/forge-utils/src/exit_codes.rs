//! Exit code constants for the forge CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CONFIG_ERROR` | Invalid CLI arguments or configuration |
//! | 3 | `GENERATION_FAILED` | A generation attempt ended in failure |
//! | 4 | `STORAGE_ERROR` | Artifact log or export I/O failed |
//! | 130 | `INTERRUPTED` | Generation was cancelled by the user |

/// Exit codes matching the table above.
///
/// Use the named constants, or [`as_i32()`](Self::as_i32) to get the numeric
/// value for `std::process::exit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// General/internal failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Configuration error - invalid config file or arguments
    pub const CONFIG_ERROR: ExitCode = ExitCode(2);

    /// Generation failed (model unreachable, unusable plan, broken stream)
    pub const GENERATION_FAILED: ExitCode = ExitCode(3);

    /// Artifact log or export write failed
    pub const STORAGE_ERROR: ExitCode = ExitCode(4);

    /// Generation cancelled by Ctrl-C
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
