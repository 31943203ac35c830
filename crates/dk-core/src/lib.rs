//! dotkc-guard core library.
//!
//! Exposes dotkc to an untrusted agent runtime without letting secret
//! values through:
//! - Process runner with timeout and output caps
//! - dotkc argument builders and path-safety checks
//! - Exec gate and command allowlist
//! - Tool definitions and dispatch through the dk-redact pipeline
//! - Structured logging and stable exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod args;
pub mod error;
pub mod exit_codes;
pub mod gate;
pub mod logging;
pub mod runner;
pub mod tools;

pub use error::{GuardError, Result};
pub use exit_codes::ExitCode;
pub use runner::{Invocation, Invoke, ProcessRunner};
pub use tools::{tool_definitions, ToolContent, ToolContext, ToolDefinition};
