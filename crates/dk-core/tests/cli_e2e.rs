//! End-to-end CLI tests for dk-core.
//!
//! Each test runs the real binary inside a scratch directory that holds its
//! own config.json, so the host's XDG and /etc configs never leak in. Tools
//! that call dotkc are pointed at small shell scripts standing in for it.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory with a config.json and optional fake dotkc scripts.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new(config: Value) -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), config.to_string()).expect("write config");
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// dk-core with the environment pinned to this sandbox.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dk-core").expect("dk-core binary should exist");
        cmd.current_dir(self.path())
            .env_remove("DK_CONFIG")
            .env_remove("DOTKC_ALLOW_EXEC")
            .env_remove("RUST_LOG")
            .env("DK_CONFIG_DIR", self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("DK_LOG", "off");
        cmd
    }

    #[cfg(unix)]
    fn fake_dotkc(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod script");
        path
    }
}

fn default_sandbox() -> Sandbox {
    Sandbox::new(json!({}))
}

fn stdout_json(output: &std::process::Output) -> Value {
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).expect("stdout should be JSON")
}

// ============================================================================
// Argument Errors
// ============================================================================

mod argument_errors {
    use super::*;

    #[test]
    fn unknown_command_exits_args_error() {
        default_sandbox()
            .cmd()
            .arg("nonexistent-command")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn help_exits_zero() {
        default_sandbox()
            .cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("exec"));
    }

    #[test]
    fn exec_requires_command_after_separator() {
        default_sandbox()
            .cmd()
            .arg("exec")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn invalid_log_level_fails() {
        default_sandbox()
            .cmd()
            .args(["--log-level", "loud", "tools"])
            .assert()
            .code(10);
    }

    #[test]
    fn missing_config_file_exits_args_error() {
        let sandbox = default_sandbox();
        let output = sandbox
            .cmd()
            .args(["--config", "does-not-exist.json", "tools"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(10));
        let body = stdout_json(&output);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["code"], json!(10));
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Config file not found"));
    }

    #[test]
    fn invalid_config_value_exits_args_error() {
        let sandbox = Sandbox::new(json!({ "timeoutMs": 0 }));
        let output = sandbox.cmd().arg("status").output().expect("run");
        assert_eq!(output.status.code(), Some(10));
        assert!(stdout_json(&output)["error"]
            .as_str()
            .unwrap()
            .contains("timeoutMs"));
    }

    #[test]
    fn call_rejects_malformed_params() {
        default_sandbox()
            .cmd()
            .args(["call", "dotkc_status", "--params", "{not json"])
            .assert()
            .code(10)
            .stdout(predicate::str::contains("--params is not valid JSON"));
    }

    #[test]
    fn call_unknown_tool_exits_args_error() {
        default_sandbox()
            .cmd()
            .args(["call", "dotkc_delete"])
            .assert()
            .code(10)
            .stdout(predicate::str::contains("dotkc_delete"));
    }
}

// ============================================================================
// Offline Commands
// ============================================================================

mod offline {
    use super::*;

    #[test]
    fn tools_lists_four_definitions() {
        let output = default_sandbox().cmd().arg("tools").output().expect("run");
        assert!(output.status.success());

        let body = stdout_json(&output);
        let names: Vec<&str> = body
            .as_array()
            .expect("array of tools")
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            ["dotkc_status", "dotkc_doctor", "dotkc_inspect", "dotkc_exec"]
        );
        assert_eq!(body[3]["inputSchema"]["required"], json!(["command"]));
    }

    #[test]
    fn scan_clean_text_exits_zero() {
        let output = default_sandbox()
            .cmd()
            .arg("scan")
            .write_stdin("build finished in 3.2s\nall tests passed\n")
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(stdout_json(&output), json!({ "ok": true, "reasons": [] }));
    }

    #[test]
    fn scan_key_value_line_exits_leak_blocked() {
        let output = default_sandbox()
            .cmd()
            .arg("scan")
            .write_stdin("starting\nAWS_SECRET=wJalrXUtnFEMI\n")
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(2));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("AWS_SECRET"));
        assert!(!stdout.contains("wJalrXUtnFEMI"));
    }

    #[test]
    fn scan_reads_file_argument() {
        let sandbox = default_sandbox();
        let token = format!("ghp_{}", "a1B2c3D4".repeat(5));
        std::fs::write(sandbox.path().join("out.log"), format!("token {}\n", token)).unwrap();

        let output = sandbox.cmd().args(["scan", "out.log"]).output().expect("run");
        assert_eq!(output.status.code(), Some(2));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("ghp_"));
        assert!(!stdout.contains(&token));
    }

    #[test]
    fn scan_missing_file_exits_io_error() {
        default_sandbox()
            .cmd()
            .args(["scan", "nope.log"])
            .assert()
            .code(21);
    }

    #[test]
    fn redact_masks_sensitive_fields() {
        let input = json!({
            "format": "openclaw",
            "vault": "default",
            "password": "hunter2",
            "env": { "DATABASE_URL": "postgres://u:p@db/app", "PORT": "8080" }
        });
        let output = default_sandbox()
            .cmd()
            .arg("redact")
            .write_stdin(input.to_string())
            .output()
            .expect("run");
        assert!(output.status.success());

        let body = stdout_json(&output);
        assert_eq!(body["vault"], json!("default"));
        assert_eq!(body["password"], json!("[REDACTED_BY_PLUGIN]"));
        assert_eq!(body["env"]["DATABASE_URL"], json!("[REDACTED_BY_PLUGIN]"));
        assert_eq!(body["env"]["PORT"], json!("[REDACTED_BY_PLUGIN]"));
    }

    #[test]
    fn redact_rejects_non_json() {
        default_sandbox()
            .cmd()
            .arg("redact")
            .write_stdin("not json at all")
            .assert()
            .code(10)
            .stdout(predicate::str::contains("input is not JSON"));
    }
}

// ============================================================================
// Exec Gate
// ============================================================================

mod exec_gate {
    use super::*;

    #[test]
    fn exec_without_gate_is_refused() {
        let sandbox = Sandbox::new(json!({ "allowedCommands": ["echo"] }));
        let output = sandbox
            .cmd()
            .args(["exec", "--", "echo", "hi"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(11));
        let body = stdout_json(&output);
        assert_eq!(body["ok"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("DOTKC_ALLOW_EXEC"));
    }

    #[test]
    fn exec_without_allowlist_is_refused() {
        default_sandbox()
            .cmd()
            .env("DOTKC_ALLOW_EXEC", "1")
            .args(["exec", "--", "echo", "hi"])
            .assert()
            .code(11);
    }

    #[test]
    fn exec_command_outside_allowlist_is_refused() {
        Sandbox::new(json!({ "allowedCommands": ["node"] }))
            .cmd()
            .env("DOTKC_ALLOW_EXEC", "1")
            .args(["exec", "--", "bash", "-c", "env"])
            .assert()
            .code(11)
            .stdout(predicate::str::contains("bash"));
    }

    #[test]
    fn exec_spec_file_traversal_is_refused() {
        Sandbox::new(json!({ "allowedCommands": ["echo"] }))
            .cmd()
            .env("DOTKC_ALLOW_EXEC", "1")
            .args(["exec", "--spec-file", "../other.spec", "--", "echo"])
            .assert()
            .code(10)
            .stdout(predicate::str::contains("specFile"));
    }
}

// ============================================================================
// Tools Against a Fake dotkc
// ============================================================================

#[cfg(unix)]
mod fake_dotkc {
    use super::*;

    fn dotkc_bin(sandbox: &Sandbox, body: &str) -> String {
        sandbox
            .fake_dotkc("dotkc", body)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn status_is_redacted() {
        let sandbox = default_sandbox();
        let bin = dotkc_bin(
            &sandbox,
            r#"printf '%s\n' '{"format":"openclaw","vault":"default","unlocked":true,"token":"short"}'"#,
        );

        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", &bin, "status"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(0));

        let body = stdout_json(&output);
        assert_eq!(body["vault"], json!("default"));
        assert_eq!(body["unlocked"], json!(true));
        assert_eq!(body["token"], json!("[REDACTED_BY_PLUGIN]"));
    }

    #[test]
    fn status_passes_openclaw_and_vault_flags() {
        let sandbox = Sandbox::new(json!({ "vaultPath": "/srv/vault" }));
        let bin = dotkc_bin(
            &sandbox,
            r#"printf '{"format":"openclaw","argv":"%s"}\n' "$*""#,
        );

        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", &bin, "status"])
            .output()
            .expect("run");
        assert_eq!(
            stdout_json(&output)["argv"],
            json!("status --openclaw --vault /srv/vault")
        );
    }

    #[test]
    fn failing_dotkc_reports_its_exit_code() {
        let sandbox = default_sandbox();
        let bin = dotkc_bin(&sandbox, "echo 'vault is locked' >&2\nexit 3");

        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", &bin, "doctor"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(1));

        let body = stdout_json(&output);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["code"], json!(3));
        assert_eq!(body["stderr"], json!("vault is locked\n"));
        assert!(body["error"].as_str().unwrap().starts_with("dotkc_doctor"));
    }

    #[test]
    fn token_in_output_is_blocked() {
        let sandbox = default_sandbox();
        let token = format!("ghp_{}", "Zx9Yw8Vu".repeat(5));
        let bin = dotkc_bin(
            &sandbox,
            &format!(
                r#"printf '%s\n' '{{"format":"openclaw","note":"{}"}}'"#,
                token
            ),
        );

        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", &bin, "status"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(2));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(!stdout.contains(&token));
        let body = stdout_json(&output);
        assert_eq!(body["code"], json!(2));
        assert!(body["reasons"].as_array().is_some_and(|r| !r.is_empty()));
    }

    #[test]
    fn inspect_values_are_masked() {
        let sandbox = default_sandbox();
        std::fs::write(sandbox.path().join("dotkc.spec"), "default:app\n").unwrap();
        let bin = dotkc_bin(
            &sandbox,
            r#"printf '%s\n' '{"format":"openclaw","env":{"PORT":"8080","MODE":"dev"}}'"#,
        );

        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", &bin, "inspect"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(0));

        let body = stdout_json(&output);
        assert_eq!(body["env"]["PORT"], json!("[REDACTED_BY_PLUGIN]"));
        assert_eq!(body["env"]["MODE"], json!("[REDACTED_BY_PLUGIN]"));
    }

    #[test]
    fn exec_returns_summary() {
        let sandbox = Sandbox::new(json!({ "allowedCommands": ["echo"] }));
        let bin = dotkc_bin(&sandbox, "echo 'server ready'");

        let output = sandbox
            .cmd()
            .env("DOTKC_ALLOW_EXEC", "1")
            .args(["--dotkc-bin", &bin, "exec", "--", "echo", "hi"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(0));

        let body = stdout_json(&output);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["code"], json!(0));
        assert_eq!(body["stdoutTail"], json!("server ready\n"));
        assert!(body["durationMs"].is_u64());
    }

    #[test]
    fn exec_leaking_child_is_blocked() {
        let sandbox = Sandbox::new(json!({ "allowedCommands": ["printenv"] }));
        let bin = dotkc_bin(&sandbox, "echo 'STRIPE_KEY=rk_live_abcdef'");

        let output = sandbox
            .cmd()
            .env("DOTKC_ALLOW_EXEC", "1")
            .args(["--dotkc-bin", &bin, "exec", "--", "printenv"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(2));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("STRIPE_KEY"));
        assert!(!stdout.contains("rk_live_abcdef"));
    }

    #[test]
    fn missing_dotkc_binary_fails() {
        let sandbox = default_sandbox();
        let output = sandbox
            .cmd()
            .args(["--dotkc-bin", "/nonexistent/dotkc", "status"])
            .output()
            .expect("run");
        assert_eq!(output.status.code(), Some(1));
        assert_eq!(stdout_json(&output)["ok"], json!(false));
    }
}
