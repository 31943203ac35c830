//! dotkc-guard configuration loading and validation.
//!
//! This crate provides:
//! - The typed plugin configuration (`config.json` or a host document)
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation with stable error codes

pub mod plugin;
pub mod resolve;
pub mod validate;

pub use plugin::{PluginConfig, DEFAULT_SPEC_FILE};
pub use resolve::{load_config, resolve_config, ConfigPath, ConfigSource, LoadedConfig};
pub use validate::{validate_config, ValidationError, ValidationResult};
