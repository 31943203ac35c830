//! dotkc argument vectors and path checks.

use crate::error::GuardError;
use dk_config::PluginConfig;
use std::path::{Component, Path};

/// `--vault <p>` / `--key <p>` for whichever paths are configured.
pub fn vault_args(cfg: &PluginConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(vault) = &cfg.vault_path {
        args.push("--vault".to_string());
        args.push(path_arg(vault));
    }
    if let Some(key) = &cfg.key_path {
        args.push("--key".to_string());
        args.push(path_arg(key));
    }
    args
}

/// `status --openclaw <vault args>`
pub fn status_args(cfg: &PluginConfig) -> Vec<String> {
    openclaw_subcommand("status", cfg)
}

/// `doctor --openclaw <vault args>`
pub fn doctor_args(cfg: &PluginConfig) -> Vec<String> {
    openclaw_subcommand("doctor", cfg)
}

fn openclaw_subcommand(name: &str, cfg: &PluginConfig) -> Vec<String> {
    let mut args = vec![name.to_string(), "--openclaw".to_string()];
    args.extend(vault_args(cfg));
    args
}

/// `run [--unsafe-values] --spec-file <f> --openclaw <vault args>`
///
/// `--unsafe-values` is only added when the config opts in.
pub fn inspect_args(cfg: &PluginConfig, spec_file: &Path) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if cfg.allow_unsafe {
        args.push("--unsafe-values".to_string());
    }
    args.push("--spec-file".to_string());
    args.push(path_arg(spec_file));
    args.push("--openclaw".to_string());
    args.extend(vault_args(cfg));
    args
}

/// `run --spec-file <f> <vault args> -- <command> <args...>`
pub fn exec_args(
    cfg: &PluginConfig,
    spec_file: &Path,
    command: &str,
    command_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--spec-file".to_string(),
        path_arg(spec_file),
    ];
    args.extend(vault_args(cfg));
    args.push("--".to_string());
    args.push(command.to_string());
    args.extend(command_args.iter().cloned());
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Reject empty paths, NUL bytes and `..` components in relative paths.
///
/// Absolute paths are accepted as-is.
pub fn check_relative_path(field: &'static str, path: &Path) -> Result<(), GuardError> {
    let unsafe_path = |reason: &str| GuardError::UnsafePath {
        field,
        reason: reason.to_string(),
    };

    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(unsafe_path("empty path"));
    }
    if raw.to_string_lossy().contains('\0') {
        return Err(unsafe_path("contains a NUL byte"));
    }
    if path.is_relative() && path.components().any(|c| c == Component::ParentDir) {
        return Err(unsafe_path("parent directory traversal"));
    }
    Ok(())
}
