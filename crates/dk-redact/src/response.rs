//! Response assembly: parse → detect → redact → outward JSON.
//!
//! Per invocation the assembler walks
//! `Start → Invoked → {ParseFailed | Parsed}` and `Parsed → {Blocked | Redacted}`.
//! Every terminal state is a [`ToolResponse`]; nothing here panics or
//! propagates an error to the caller.

use crate::detect::{LeakDetector, LeakReason, Verdict};
use crate::error::{RedactError, Result};
use crate::redact::{redact_counted, SafetyMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Discriminator field in dotkc's `--openclaw` envelope.
pub const FORMAT_FIELD: &str = "format";

/// Expected discriminator value.
pub const ENVELOPE_FORMAT: &str = "openclaw";

/// Max characters of stderr carried by a failure response (prefix kept).
pub const STDERR_LIMIT: usize = 2000;

/// Max characters of each stream carried by an execution summary (suffix kept).
pub const TAIL_LIMIT: usize = 4000;

/// Response code used for blocked output.
pub const LEAK_BLOCKED_CODE: i32 = 2;

pub const LEAK_BLOCKED_ERROR: &str =
    "LEAK_BLOCKED: output looks like it contains secret material and was not forwarded";

pub const LEAK_BLOCKED_HINT: &str = "Run the command outside the agent session, or keep dotkc's \
     default redacted output. Never enable unsafe value output in agent workflows.";

/// Substituted for a failure's stderr when the stderr itself trips the detector.
pub const STDERR_WITHHELD: &str = "[stderr withheld: leak detector matched]";

const RENDER_FALLBACK: &str = r#"{"ok": false, "code": 1, "error": "failed to render response"}"#;

/// Completed result of one external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalResult {
    /// Exit code; a missing code is normalized to a non-zero value by the runner.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExternalResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Set the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outward-facing result of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    /// The tool's output could not be used.
    Failure {
        code: i32,
        error: String,
        stderr: String,
    },
    /// The leak detector fired; no payload is carried.
    Blocked { reasons: Vec<LeakReason> },
    /// A redacted document and how many leaves were masked.
    Success { document: Value, replaced: usize },
    /// Summary of an executed command.
    Execution {
        ok: bool,
        code: i32,
        duration_ms: u64,
        stdout_tail: String,
        stderr_tail: String,
    },
}

/// Discriminant of a [`ToolResponse`], for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Failure,
    Blocked,
    Success,
    Execution,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResponseKind::Failure => "failure",
            ResponseKind::Blocked => "blocked",
            ResponseKind::Success => "success",
            ResponseKind::Execution => "execution",
        };
        write!(f, "{}", s)
    }
}

impl ToolResponse {
    /// Build a failure, truncating stderr to [`STDERR_LIMIT`] characters.
    pub fn failure(code: i32, error: impl Into<String>, stderr: &str) -> Self {
        ToolResponse::Failure {
            code,
            error: error.into(),
            stderr: head_chars(stderr, STDERR_LIMIT),
        }
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            ToolResponse::Failure { .. } => ResponseKind::Failure,
            ToolResponse::Blocked { .. } => ResponseKind::Blocked,
            ToolResponse::Success { .. } => ResponseKind::Success,
            ToolResponse::Execution { .. } => ResponseKind::Execution,
        }
    }

    /// Whether the call produced usable output.
    pub fn is_ok(&self) -> bool {
        match self {
            ToolResponse::Success { .. } => true,
            ToolResponse::Execution { ok, .. } => *ok,
            ToolResponse::Failure { .. } | ToolResponse::Blocked { .. } => false,
        }
    }

    /// JSON shape handed to the consumer.
    pub fn to_json(&self) -> Value {
        match self {
            ToolResponse::Failure {
                code,
                error,
                stderr,
            } => json!({
                "ok": false,
                "code": code,
                "error": error,
                "stderr": stderr,
            }),
            ToolResponse::Blocked { reasons } => json!({
                "ok": false,
                "code": LEAK_BLOCKED_CODE,
                "error": LEAK_BLOCKED_ERROR,
                "reasons": reasons,
                "hint": LEAK_BLOCKED_HINT,
            }),
            ToolResponse::Success { document, .. } => document.clone(),
            ToolResponse::Execution {
                ok,
                code,
                duration_ms,
                stdout_tail,
                stderr_tail,
            } => json!({
                "ok": ok,
                "code": code,
                "durationMs": duration_ms,
                "stdoutTail": stdout_tail,
                "stderrTail": stderr_tail,
            }),
        }
    }

    /// Pretty-printed JSON text block.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.to_json())
            .unwrap_or_else(|_| RENDER_FALLBACK.to_string())
    }
}

/// Parse dotkc's `--openclaw` envelope from stdout.
///
/// Surrounding whitespace is tolerated. The document must be an object whose
/// [`FORMAT_FIELD`] equals [`ENVELOPE_FORMAT`].
pub fn parse_envelope(stdout: &str) -> Result<Value> {
    let doc = parse_json(stdout)?;
    check_envelope(&doc)?;
    Ok(doc)
}

fn check_envelope(doc: &Value) -> Result<()> {
    let obj = doc.as_object().ok_or(RedactError::NotAnObject)?;
    match obj.get(FORMAT_FIELD) {
        None => Err(RedactError::MissingFormat(FORMAT_FIELD)),
        Some(Value::String(f)) if f == ENVELOPE_FORMAT => Ok(()),
        Some(_) => Err(RedactError::FormatMismatch {
            expected: ENVELOPE_FORMAT,
        }),
    }
}

/// Whitespace-tolerant parse of any JSON value.
pub fn parse_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RedactError::EmptyOutput);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Combines the leak detector and redactor into tool responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler {
    detector: LeakDetector,
}

impl ResponseAssembler {
    pub fn new(detector: LeakDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &LeakDetector {
        &self.detector
    }

    /// Status/doctor/inspect-style calls: the redacted envelope is the payload.
    pub fn assemble_document(
        &self,
        tool: &str,
        result: &ExternalResult,
        mode: SafetyMode,
    ) -> ToolResponse {
        let parsed = match parse_envelope(&result.stdout) {
            Ok(doc) => doc,
            Err(e) => {
                let error = format!("{}: failed to parse dotkc --openclaw JSON ({})", tool, e);
                return self.failure(result, error);
            }
        };

        match self
            .detector
            .verdict(&result.stdout, &result.stderr, Some(&parsed))
        {
            Verdict::Blocked(reasons) => ToolResponse::Blocked { reasons },
            Verdict::Clear => {
                let redacted = redact_counted(&parsed, mode);
                ToolResponse::Success {
                    document: redacted.document,
                    replaced: redacted.replaced,
                }
            }
        }
    }

    /// Exec-style calls: detection runs on the raw streams whether or not
    /// stdout is JSON, then a summary with stream tails is returned.
    pub fn assemble_execution(&self, result: &ExternalResult) -> ToolResponse {
        let parsed = parse_json(&result.stdout).ok();
        let verdict = self
            .detector
            .verdict(&result.stdout, &result.stderr, parsed.as_ref());
        if let Verdict::Blocked(reasons) = verdict {
            return ToolResponse::Blocked { reasons };
        }

        ToolResponse::Execution {
            ok: result.success(),
            code: result.exit_code,
            duration_ms: result.elapsed.as_millis() as u64,
            stdout_tail: tail_chars(&result.stdout, TAIL_LIMIT),
            stderr_tail: tail_chars(&result.stderr, TAIL_LIMIT),
        }
    }

    /// Failure that never forwards stderr the detector objects to.
    fn failure(&self, result: &ExternalResult, error: String) -> ToolResponse {
        if self.detector.detect_text(&result.stderr).is_empty() {
            ToolResponse::failure(result.exit_code, error, &result.stderr)
        } else {
            ToolResponse::failure(result.exit_code, error, STDERR_WITHHELD)
        }
    }
}

/// First `max` characters of `s`.
pub fn head_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Last `max` characters of `s`.
pub fn tail_chars(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    match s.char_indices().rev().nth(max - 1) {
        Some((idx, _)) => s[idx..].to_string(),
        None => s.to_string(),
    }
}
