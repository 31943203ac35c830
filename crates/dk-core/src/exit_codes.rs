//! Exit codes for the dk-core CLI.
//!
//! Exit code ranges:
//! - 0-2: Tool outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use dk_redact::ToolResponse;

/// Exit codes for dk-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Tool Outcomes (0-2)
    // ========================================================================
    /// Output forwarded (document or successful execution)
    Success = 0,

    /// The tool failed or its output could not be used
    ToolFailure = 1,

    /// The leak detector withheld the output
    LeakBlocked = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments, parameters or configuration
    ArgsError = 10,

    /// Exec gate closed or command not allowlisted
    GateRefused = 11,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Exit code for a finished tool call.
    pub fn for_response(response: &ToolResponse) -> Self {
        match response {
            ToolResponse::Success { .. } => ExitCode::Success,
            ToolResponse::Execution { ok: true, .. } => ExitCode::Success,
            ToolResponse::Execution { ok: false, .. } | ToolResponse::Failure { .. } => {
                ExitCode::ToolFailure
            }
            ToolResponse::Blocked { .. } => ExitCode::LeakBlocked,
        }
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::ToolFailure => "ERR_TOOL",
            ExitCode::LeakBlocked => "ERR_LEAK_BLOCKED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::GateRefused => "ERR_GATE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
