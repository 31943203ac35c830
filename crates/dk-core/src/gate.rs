//! Exec gate and command allowlist.

use crate::error::GuardError;

/// Environment variable that must be truthy before `dotkc_exec` runs.
pub const ENV_ALLOW_EXEC: &str = "DOTKC_ALLOW_EXEC";

/// Whether the process environment opens the exec gate.
pub fn exec_enabled() -> bool {
    exec_enabled_from(std::env::var(ENV_ALLOW_EXEC).ok().as_deref())
}

/// `1`, `true` or `yes` (case-insensitive) open the gate; anything else keeps it shut.
pub fn exec_enabled_from(value: Option<&str>) -> bool {
    value
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Fail with [`GuardError::ExecDisabled`] unless the gate is open.
pub fn check_exec_gate(enabled: bool) -> Result<(), GuardError> {
    if enabled {
        Ok(())
    } else {
        Err(GuardError::ExecDisabled)
    }
}

/// The allowlist must be configured and non-empty, and `command` must be a
/// bare basename listed in it.
pub fn check_allowlist(allowed: Option<&[String]>, command: &str) -> Result<(), GuardError> {
    let allowed = match allowed {
        Some(list) if !list.is_empty() => list,
        _ => return Err(GuardError::MissingAllowlist),
    };

    if command.is_empty() || command.contains(['/', '\\']) {
        return Err(GuardError::CommandNotAllowed(command.to_string()));
    }
    if !allowed.iter().any(|c| c == command) {
        return Err(GuardError::CommandNotAllowed(command.to_string()));
    }
    Ok(())
}
