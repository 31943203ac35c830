//! Leak detection and redaction engine for dotkc tool output.
//!
//! This crate decides whether the output of a secret-resolution command is
//! safe to hand to an untrusted consumer such as a model-driven agent, and
//! if so produces a redacted copy that keeps the document's shape.
//!
//! # Key Features
//!
//! - **Leak detection**: `KEY=VALUE` lines, well-known credential prefixes and
//!   high-entropy strings. Reasons never include the detected value.
//! - **Structural redaction**: sensitive field names and bulk environment maps
//!   are replaced by a fixed marker; key sets and array lengths are kept.
//! - **Fail-closed**: a single detector hit blocks the whole payload. Blocked
//!   responses never carry stdout or the parsed document.
//! - **Pure**: no I/O, no shared state; safe to call from any number of
//!   threads at once.
//!
//! # Example
//!
//! ```
//! use dk_redact::{ExternalResult, ResponseAssembler, SafetyMode, ToolResponse};
//!
//! let assembler = ResponseAssembler::default();
//! let result = ExternalResult::new(0, r#"{"format":"openclaw","token":"abc"}"#, "");
//! let response = assembler.assemble_document("dotkc_status", &result, SafetyMode::Strict);
//! assert!(matches!(response, ToolResponse::Success { replaced: 1, .. }));
//! assert!(!response.render().contains("\"abc\""));
//! ```

pub mod detect;
pub mod entropy;
pub mod error;
pub mod policy;
pub mod redact;
pub mod response;

pub use detect::{LeakDetector, LeakReason, LeakRule, Verdict, TOKEN_PREFIXES};
pub use entropy::shannon_entropy;
pub use error::{RedactError, Result};
pub use policy::DetectorPolicy;
pub use redact::{
    is_bulk_env_key, is_sensitive_key, redact, redact_counted, Redacted, SafetyMode,
    REDACTION_MARKER,
};
pub use response::{
    parse_envelope, parse_json, ExternalResult, ResponseAssembler, ResponseKind, ToolResponse,
};
