//! Error types for the leak-detection engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RedactError>;

/// Errors that can occur while parsing the tool's envelope.
///
/// Messages never carry fragments of the inspected output.
#[derive(Error, Debug)]
pub enum RedactError {
    /// The external tool printed nothing on stdout.
    #[error("no output to parse")]
    EmptyOutput,

    /// Stdout was not a JSON document.
    #[error("output is not valid JSON: {0}")]
    InvalidJson(String),

    /// Stdout was JSON but not an object.
    #[error("output is not a JSON object")]
    NotAnObject,

    /// The envelope discriminator field is absent.
    #[error("missing envelope field `{0}`")]
    MissingFormat(&'static str),

    /// The envelope discriminator names another format.
    #[error("unexpected envelope format (expected `{expected}`)")]
    FormatMismatch { expected: &'static str },
}

impl From<serde_json::Error> for RedactError {
    fn from(err: serde_json::Error) -> Self {
        // Only the category and position survive; serde_json never echoes
        // input for untyped parses, but keep it that way explicitly.
        RedactError::InvalidJson(format!(
            "{:?} error at line {} column {}",
            err.classify(),
            err.line(),
            err.column()
        ))
    }
}
