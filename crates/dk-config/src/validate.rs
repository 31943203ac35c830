//! Configuration validation errors and semantic validation.

use crate::plugin::PluginConfig;
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Characters that must never appear in an allowlisted command name.
const SHELL_METACHARS: &[char] = &[
    '|', '&', ';', '$', '`', '<', '>', '(', ')', '*', '?', '"', '\'',
];

/// Upper bound for Shannon entropy over bytes.
const MAX_ENTROPY_BITS: f64 = 8.0;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
        }
    }

    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate plugin configuration semantically.
pub fn validate_config(config: &PluginConfig) -> ValidationResult<()> {
    if config.dotkc_bin.trim().is_empty() {
        return Err(ValidationError::MissingField("dotkcBin".to_string()));
    }

    if config.timeout_ms == 0 {
        return Err(ValidationError::invalid("timeoutMs", "Must be positive, got 0"));
    }

    let threshold = config.detector.entropy_threshold;
    if !(threshold > 0.0 && threshold <= MAX_ENTROPY_BITS) {
        return Err(ValidationError::invalid(
            "detector.entropyThreshold",
            format!("Must be in (0, {}], got {}", MAX_ENTROPY_BITS, threshold),
        ));
    }

    if config.detector.min_length == 0 {
        return Err(ValidationError::invalid(
            "detector.minLength",
            "Must be at least 1, got 0",
        ));
    }

    for (idx, prefix) in config.detector.token_prefixes.iter().enumerate() {
        if prefix.is_empty() {
            return Err(ValidationError::invalid(
                format!("detector.tokenPrefixes[{}]", idx),
                "Must not be empty",
            ));
        }
    }

    if let Some(commands) = &config.allowed_commands {
        for (idx, command) in commands.iter().enumerate() {
            validate_command_name(command).map_err(|message| {
                ValidationError::invalid(format!("allowedCommands[{}]", idx), message)
            })?;
        }
    }

    Ok(())
}

/// An allowlist entry must be a bare executable basename.
fn validate_command_name(command: &str) -> Result<(), String> {
    if command.is_empty() {
        return Err("Must not be empty".to_string());
    }
    if command.contains(['/', '\\']) {
        return Err(format!("Must be a basename without path separators: {}", command));
    }
    if command.chars().any(char::is_whitespace) {
        return Err(format!("Must not contain whitespace: {:?}", command));
    }
    if command.contains(SHELL_METACHARS) {
        return Err(format!("Contains shell metacharacters: {}", command));
    }
    Ok(())
}
