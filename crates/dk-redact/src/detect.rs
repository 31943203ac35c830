//! Leak detection over raw tool output and its parsed document.
//!
//! Three rule families run in a fixed order, each contributing at most one
//! reason:
//!
//! 1. `KEY=VALUE` lines in stdout/stderr (dotenv-style dumps).
//! 2. Literal prefixes of well-known credential formats.
//! 3. High-entropy string leaves in the parsed JSON document.
//!
//! Reasons describe *where* or *what kind* of secret was seen (a key name, a
//! prefix, a length and entropy) and never carry the matched value.

use crate::entropy::shannon_entropy;
use crate::policy::DetectorPolicy;
use crate::redact::REDACTION_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Built-in credential prefixes, checked in order.
pub const TOKEN_PREFIXES: &[&str] = &[
    // Anthropic / OpenAI project keys
    "sk-ant-",
    "sk-proj-",
    // GitHub
    "ghp_",
    "gho_",
    "ghu_",
    "ghs_",
    "ghr_",
    "github_pat_",
    // GitLab
    "glpat-",
    // Slack
    "xoxb-",
    "xoxp-",
    "xoxa-",
    "xapp-",
    // AWS access key ids (long-term and STS)
    "AKIA",
    "ASIA",
    // Google API keys
    "AIza",
];

/// Classic OpenAI secret keys. Bare `sk-` is too common a substring, so it
/// only counts at a word start and followed by a long key body.
pub const OPENAI_KEY_PREFIX: &str = "sk-";

static OPENAI_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsk-[A-Za-z0-9_-]{20,}").unwrap());

/// Values that are already redacted and must not trip the KEY=VALUE rule.
pub const KNOWN_MARKERS: &[&str] = &[REDACTION_MARKER, "[REDACTED]"];

static KEY_VALUE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Z_][A-Z0-9_]{2,})=(.*)$").unwrap());

// dotkc's own masked preview: `*** (len=12)`
static MASKED_LEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*\* \(len=\d+\)$").unwrap());

/// Rule family that produced a [`LeakReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeakRule {
    KeyValue,
    TokenPrefix,
    HighEntropy,
}

/// A single diagnostic explaining why output was blocked.
///
/// There is deliberately no variant able to hold the offending value.
#[derive(Debug, Clone, PartialEq)]
pub enum LeakReason {
    /// A `KEY=VALUE` line; only the key is kept.
    KeyValue { key: String },
    /// A known credential prefix occurred in the raw text.
    TokenPrefix { prefix: String },
    /// A long string leaf with high character entropy.
    HighEntropy { len: usize, entropy: f64 },
}

impl LeakReason {
    /// The rule family this reason belongs to.
    pub fn rule(&self) -> LeakRule {
        match self {
            LeakReason::KeyValue { .. } => LeakRule::KeyValue,
            LeakReason::TokenPrefix { .. } => LeakRule::TokenPrefix,
            LeakReason::HighEntropy { .. } => LeakRule::HighEntropy,
        }
    }
}

impl fmt::Display for LeakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakReason::KeyValue { key } => {
                write!(f, "KEY=VALUE pattern detected in output (key: {})", key)
            }
            LeakReason::TokenPrefix { prefix } => {
                write!(f, "known token prefix detected in output ({})", prefix)
            }
            LeakReason::HighEntropy { len, entropy } => write!(
                f,
                "high-entropy string detected in JSON (len={}, entropy={:.2})",
                len, entropy
            ),
        }
    }
}

impl Serialize for LeakReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Admission decision for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Clear,
    Blocked(Vec<LeakReason>),
}

impl Verdict {
    /// Build a verdict from detector output.
    pub fn from_reasons(reasons: Vec<LeakReason>) -> Self {
        if reasons.is_empty() {
            Verdict::Clear
        } else {
            Verdict::Blocked(reasons)
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Verdict::Clear)
    }
}

/// Leak detector for tool output.
#[derive(Debug, Clone, Default)]
pub struct LeakDetector {
    policy: DetectorPolicy,
}

impl LeakDetector {
    /// Create a detector with the given tuning policy.
    pub fn new(policy: DetectorPolicy) -> Self {
        Self { policy }
    }

    /// Get a reference to the policy.
    pub fn policy(&self) -> &DetectorPolicy {
        &self.policy
    }

    /// Run every rule family and return the accumulated reasons.
    ///
    /// An empty result means the output is safe to forward. A missing
    /// document only disables the entropy rule.
    pub fn detect(&self, stdout: &str, stderr: &str, parsed: Option<&Value>) -> Vec<LeakReason> {
        let combined = format!("{}\n{}", stdout, stderr);

        let mut reasons = self.detect_text(&combined);
        if let Some(reason) = parsed.and_then(|doc| self.find_high_entropy(doc)) {
            reasons.push(reason);
        }
        reasons
    }

    /// Convenience wrapper returning a [`Verdict`].
    pub fn verdict(&self, stdout: &str, stderr: &str, parsed: Option<&Value>) -> Verdict {
        Verdict::from_reasons(self.detect(stdout, stderr, parsed))
    }

    /// Run only the raw-text rules (KEY=VALUE and token prefixes).
    pub fn detect_text(&self, text: &str) -> Vec<LeakReason> {
        let mut reasons = Vec::new();
        if let Some(reason) = find_key_value(text) {
            reasons.push(reason);
        }
        if let Some(reason) = self.find_token_prefix(text) {
            reasons.push(reason);
        }
        reasons
    }

    fn find_token_prefix(&self, text: &str) -> Option<LeakReason> {
        TOKEN_PREFIXES
            .iter()
            .copied()
            .chain(self.policy.token_prefixes.iter().map(String::as_str))
            .filter(|prefix| !prefix.is_empty())
            .find(|prefix| text.contains(prefix))
            .or_else(|| OPENAI_KEY.is_match(text).then_some(OPENAI_KEY_PREFIX))
            .map(|prefix| LeakReason::TokenPrefix {
                prefix: prefix.to_string(),
            })
    }

    /// Depth-first walk over string leaves, stopping at the first hit.
    fn find_high_entropy(&self, value: &Value) -> Option<LeakReason> {
        match value {
            Value::String(s) => self.check_entropy(s),
            Value::Array(items) => items.iter().find_map(|v| self.find_high_entropy(v)),
            Value::Object(map) => map.values().find_map(|v| self.find_high_entropy(v)),
            Value::Null | Value::Bool(_) | Value::Number(_) => None,
        }
    }

    fn check_entropy(&self, s: &str) -> Option<LeakReason> {
        let len = s.chars().count();
        if len < self.policy.min_length {
            return None;
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return None;
        }
        // Known false-negative surface: anything with a `/` counts as a path.
        if s.contains('/') && len < self.policy.path_exempt_max_len {
            return None;
        }

        let entropy = shannon_entropy(s);
        if entropy >= self.policy.entropy_threshold {
            Some(LeakReason::HighEntropy { len, entropy })
        } else {
            None
        }
    }
}

/// First genuine `KEY=VALUE` line, skipping values that are already masked.
fn find_key_value(text: &str) -> Option<LeakReason> {
    text.lines().find_map(|line| {
        let caps = KEY_VALUE_LINE.captures(line)?;
        let raw = caps.get(2)?.as_str();
        if raw.is_empty() || is_masked(raw.trim()) {
            return None;
        }
        Some(LeakReason::KeyValue {
            key: caps[1].to_string(),
        })
    })
}

fn is_masked(value: &str) -> bool {
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    KNOWN_MARKERS.contains(&unquoted) || MASKED_LEN.is_match(unquoted)
}
