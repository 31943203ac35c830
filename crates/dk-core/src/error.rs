//! Error types for the guarded tool surface.
//!
//! None of these carry captured output or document values; the only
//! user-supplied strings kept are command names and parameter names.

use crate::exit_codes::ExitCode;
use dk_config::ValidationError;
use dk_redact::ToolResponse;
use thiserror::Error;

/// Result type for dk-core operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Refusals and configuration problems raised before or around an invocation.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("allowedCommands is not configured; dotkc_exec is disabled")]
    MissingAllowlist,

    #[error("command not in allowlist: {0}")]
    CommandNotAllowed(String),

    #[error("unsafe path for {field}: {reason}")]
    UnsafePath { field: &'static str, reason: String },

    #[error("exec is disabled; set DOTKC_ALLOW_EXEC=1 to enable dotkc_exec")]
    ExecDisabled,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("config error: {0}")]
    Config(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Stable exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            GuardError::MissingAllowlist
            | GuardError::CommandNotAllowed(_)
            | GuardError::ExecDisabled => ExitCode::GateRefused,
            GuardError::UnsafePath { .. }
            | GuardError::InvalidParams(_)
            | GuardError::UnknownTool(_)
            | GuardError::Config(_) => ExitCode::ArgsError,
            GuardError::Spawn { .. } => ExitCode::ToolFailure,
            GuardError::Io(_) => ExitCode::IoError,
        }
    }

    /// Structured failure handed to the consumer in place of tool output.
    pub fn to_response(&self) -> ToolResponse {
        ToolResponse::failure(self.exit_code().as_i32(), self.to_string(), "")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        GuardError::InvalidParams(message.into())
    }
}
