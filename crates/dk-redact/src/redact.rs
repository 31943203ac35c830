//! Shape-preserving redaction of JSON documents.
//!
//! Two rules apply under [`SafetyMode::Strict`]:
//!
//! - **Sensitive fields**: a string value whose key looks like `value`,
//!   `secret`, `token`, `apikey`, `api_key` or `password` (case-insensitive,
//!   alone or as an underscore-delimited segment) is replaced by the marker.
//! - **Bulk env maps**: under `env`, `dotenv` or `values`, the keys are
//!   user-chosen variable names, so every string entry is replaced
//!   regardless of its name.
//!
//! Only leaf strings change; key sets, array lengths and nesting never do.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel substituted for redacted leaf values.
pub const REDACTION_MARKER: &str = "[REDACTED_BY_PLUGIN]";

/// Keys whose object value is a map of environment variables.
pub const BULK_ENV_KEYS: &[&str] = &["env", "dotenv", "values"];

static SENSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|_)(value|secret|token|apikey|api_key|password)(_|$)").unwrap()
});

/// Redaction policy for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Never emit raw sensitive values (default).
    #[default]
    Strict,
    /// Explicit opt-in: documents pass through unredacted.
    Permissive,
}

impl SafetyMode {
    /// Map the `allowUnsafe` configuration flag to a mode.
    pub fn from_allow_unsafe(allow_unsafe: bool) -> Self {
        if allow_unsafe {
            SafetyMode::Permissive
        } else {
            SafetyMode::Strict
        }
    }

    /// Parse from string.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Some(SafetyMode::Strict),
            "permissive" | "unsafe" => Some(SafetyMode::Permissive),
            _ => None,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, SafetyMode::Strict)
    }
}

impl std::fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyMode::Strict => write!(f, "strict"),
            SafetyMode::Permissive => write!(f, "permissive"),
        }
    }
}

/// Whether a key name belongs to the sensitive-field vocabulary.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Whether a key names a bulk environment map.
pub fn is_bulk_env_key(key: &str) -> bool {
    BULK_ENV_KEYS.contains(&key)
}

/// Result of a redaction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Redacted {
    /// The redacted copy.
    pub document: Value,
    /// Number of leaf strings replaced by the marker.
    pub replaced: usize,
}

/// Produce a redacted deep copy of `doc`.
///
/// `Permissive` returns an unchanged copy.
pub fn redact(doc: &Value, mode: SafetyMode) -> Value {
    redact_counted(doc, mode).document
}

/// Like [`redact`], also reporting how many leaves were replaced.
pub fn redact_counted(doc: &Value, mode: SafetyMode) -> Redacted {
    match mode {
        SafetyMode::Permissive => Redacted {
            document: doc.clone(),
            replaced: 0,
        },
        SafetyMode::Strict => {
            let mut replaced = 0;
            let document = redact_value(doc, &mut replaced);
            Redacted { document, replaced }
        }
    }
}

fn redact_value(value: &Value, replaced: &mut usize) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_value(v, replaced)).collect())
        }
        Value::Object(map) => Value::Object(redact_object(map, replaced)),
    }
}

fn redact_object(map: &Map<String, Value>, replaced: &mut usize) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let redacted = match value {
            Value::String(_) if is_sensitive_key(key) => marker(replaced),
            Value::Object(env) if is_bulk_env_key(key) => {
                Value::Object(redact_env_map(env, replaced))
            }
            _ => redact_value(value, replaced),
        };
        out.insert(key.clone(), redacted);
    }
    out
}

/// Every string entry is replaced; anything else goes through the general rule.
fn redact_env_map(env: &Map<String, Value>, replaced: &mut usize) -> Map<String, Value> {
    env.iter()
        .map(|(name, value)| {
            let redacted = match value {
                Value::String(_) => marker(replaced),
                other => redact_value(other, replaced),
            };
            (name.clone(), redacted)
        })
        .collect()
}

fn marker(replaced: &mut usize) -> Value {
    *replaced += 1;
    Value::String(REDACTION_MARKER.to_string())
}
