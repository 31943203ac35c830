//! Typed plugin configuration.
//!
//! A config file is either the plugin block itself or a full host document
//! from which the block is extracted (see [`PluginConfig::from_host_config`]).

use crate::validate::{ValidationError, ValidationResult};
use dk_redact::{DetectorPolicy, SafetyMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Plugin ids looked up in a host document, in order.
pub const PLUGIN_IDS: &[&str] = &["dotkc-openclaw-plugin", "dotkc"];

/// Spec file used by the inspect tool when none is configured.
pub const DEFAULT_SPEC_FILE: &str = "./dotkc.spec";

/// Default executable name.
pub const DEFAULT_DOTKC_BIN: &str = "dotkc";

/// Default per-invocation timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Executable to invoke.
    #[serde(default = "default_dotkc_bin")]
    pub dotkc_bin: String,

    /// Passed as `--vault`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<PathBuf>,

    /// Passed as `--key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Default spec file for inspect/exec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_file: Option<PathBuf>,

    /// Opt in to unredacted inspect output.
    #[serde(default)]
    pub allow_unsafe: bool,

    /// Executable basenames the exec tool may run. `None` disables exec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_commands: Option<Vec<String>>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Leak detector tuning.
    #[serde(default)]
    pub detector: DetectorPolicy,
}

fn default_dotkc_bin() -> String {
    DEFAULT_DOTKC_BIN.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            dotkc_bin: default_dotkc_bin(),
            vault_path: None,
            key_path: None,
            spec_file: None,
            allow_unsafe: false,
            allowed_commands: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            detector: DetectorPolicy::default(),
        }
    }
}

impl PluginConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse either a bare plugin block or a host document.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))?;

        if value.get("plugins").is_some() {
            Self::from_host_config(&value)
        } else {
            Self::from_value(value)
        }
    }

    /// Extract the plugin block from a host document.
    ///
    /// Looks under `plugins.entries.<id>.config` for each id in
    /// [`PLUGIN_IDS`]. A host document without either entry yields defaults.
    pub fn from_host_config(host: &Value) -> ValidationResult<Self> {
        let block = PLUGIN_IDS.iter().find_map(|id| {
            host.get("plugins")?
                .get("entries")?
                .get(*id)?
                .get("config")
                .filter(|c| !c.is_null())
        });

        match block {
            Some(config) => Self::from_value(config.clone()),
            None => Ok(Self::default()),
        }
    }

    fn from_value(value: Value) -> ValidationResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ValidationError::ParseError(format!("Invalid plugin config: {}", e)))
    }

    /// Redaction mode implied by `allowUnsafe`.
    pub fn safety_mode(&self) -> SafetyMode {
        SafetyMode::from_allow_unsafe(self.allow_unsafe)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured spec file, or [`DEFAULT_SPEC_FILE`].
    pub fn spec_file_or_default(&self) -> PathBuf {
        self.spec_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SPEC_FILE))
    }
}
