//! Detector tuning policy.
//!
//! The thresholds used by the high-entropy rule are heuristics, not
//! contracts, so they live here as serde-loadable settings rather than
//! hard-coded constants.

use serde::{Deserialize, Serialize};

/// Default minimum string length (in chars) considered by the entropy rule.
pub const DEFAULT_MIN_LENGTH: usize = 32;

/// Default entropy threshold in bits per character (inclusive).
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 4.0;

/// Strings containing a path separator and shorter than this are skipped.
pub const DEFAULT_PATH_EXEMPT_MAX_LEN: usize = 180;

/// Tuning parameters for [`crate::LeakDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorPolicy {
    /// Minimum length for entropy analysis.
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Entropy threshold for high-entropy detection.
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,

    /// Path-like strings below this length are exempt from entropy scanning.
    #[serde(default = "default_path_exempt_max_len")]
    pub path_exempt_max_len: usize,

    /// Extra literal token prefixes, checked after the built-in list.
    #[serde(default)]
    pub token_prefixes: Vec<String>,
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

fn default_entropy_threshold() -> f64 {
    DEFAULT_ENTROPY_THRESHOLD
}

fn default_path_exempt_max_len() -> usize {
    DEFAULT_PATH_EXEMPT_MAX_LEN
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
            path_exempt_max_len: DEFAULT_PATH_EXEMPT_MAX_LEN,
            token_prefixes: Vec::new(),
        }
    }
}

impl DetectorPolicy {
    /// Create a new policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entropy threshold.
    pub fn with_entropy_threshold(mut self, threshold: f64) -> Self {
        self.entropy_threshold = threshold;
        self
    }

    /// Set the minimum length for entropy analysis.
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Add a custom token prefix.
    pub fn with_token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_prefixes.push(prefix.into());
        self
    }
}
