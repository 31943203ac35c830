//! Tool definitions and dispatch.
//!
//! Each tool maps to one dotkc invocation whose output goes through the
//! leak detector and redactor before anything is returned.

use crate::args::{check_relative_path, doctor_args, exec_args, inspect_args, status_args};
use crate::error::{GuardError, Result};
use crate::gate::{check_allowlist, check_exec_gate, exec_enabled};
use crate::runner::{Invocation, Invoke, ProcessRunner};
use dk_config::PluginConfig;
use dk_redact::{LeakDetector, ResponseAssembler, SafetyMode, ToolResponse};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub const TOOL_STATUS: &str = "dotkc_status";
pub const TOOL_DOCTOR: &str = "dotkc_doctor";
pub const TOOL_INSPECT: &str = "dotkc_inspect";
pub const TOOL_EXEC: &str = "dotkc_exec";

/// Tool definition for tools/list style listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Content block returned from tool calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Build the list of available tool definitions.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_STATUS.to_string(),
            description: "Show dotkc vault status as OpenClaw JSON. \
                          Sensitive fields are always redacted."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: TOOL_DOCTOR.to_string(),
            description: "Run dotkc doctor diagnostics. Sensitive fields are always redacted."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: TOOL_INSPECT.to_string(),
            description: "Resolve allowlisted specs and return a redacted env preview. \
                          Values are never returned unless unsafe output is explicitly configured."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "specFile": {
                        "type": "string",
                        "description": "Spec file to resolve (default: ./dotkc.spec)"
                    }
                },
                "required": [],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: TOOL_EXEC.to_string(),
            description: "Run an allowlisted command with secrets injected by dotkc. \
                          Requires DOTKC_ALLOW_EXEC=1 and allowedCommands. \
                          Returns exit code and output tails, or a block if output looks sensitive."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Executable basename; must appear in allowedCommands"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Arguments passed to the command",
                        "default": []
                    },
                    "specFile": {
                        "type": "string",
                        "description": "Spec file to resolve (default: ./dotkc.spec)"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        },
    ]
}

/// Everything a tool call needs: config, a runner and the response pipeline.
pub struct ToolContext<R: Invoke = ProcessRunner> {
    config: PluginConfig,
    runner: R,
    assembler: ResponseAssembler,
    exec_enabled: bool,
}

impl ToolContext<ProcessRunner> {
    /// Context backed by real child processes; the exec gate is read from the environment.
    pub fn from_config(config: PluginConfig) -> Self {
        Self::new(config, ProcessRunner::new())
    }
}

impl<R: Invoke> ToolContext<R> {
    pub fn new(config: PluginConfig, runner: R) -> Self {
        let assembler = ResponseAssembler::new(LeakDetector::new(config.detector.clone()));
        Self {
            config,
            runner,
            assembler,
            exec_enabled: exec_enabled(),
        }
    }

    /// Override the exec gate.
    pub fn with_exec_enabled(mut self, enabled: bool) -> Self {
        self.exec_enabled = enabled;
        self
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    /// Dispatch a tool call by name and return text content blocks.
    ///
    /// Refusals become structured failure responses; nothing is propagated.
    pub fn call_tool(&self, name: &str, params: &Value) -> Vec<ToolContent> {
        let response = self.call(name, params).unwrap_or_else(|e| {
            warn!(tool = name, error = %e, "tool call refused");
            e.to_response()
        });
        vec![ToolContent::text(response.render())]
    }

    /// Dispatch a tool call by name.
    ///
    /// `Err` is returned only for refusals raised before dotkc runs.
    #[instrument(skip(self, name, params), fields(tool = %name))]
    pub fn call(&self, name: &str, params: &Value) -> Result<ToolResponse> {
        let params = params_object(params)?;
        let response = match name {
            TOOL_STATUS => {
                let args = status_args(&self.config);
                self.tool_document(TOOL_STATUS, args, SafetyMode::Strict)
            }
            TOOL_DOCTOR => {
                let args = doctor_args(&self.config);
                self.tool_document(TOOL_DOCTOR, args, SafetyMode::Strict)
            }
            TOOL_INSPECT => self.tool_inspect(&params)?,
            TOOL_EXEC => self.tool_exec(&params)?,
            _ => return Err(GuardError::UnknownTool(name.to_string())),
        };

        match &response {
            ToolResponse::Blocked { reasons } => {
                warn!(reasons = reasons.len(), "output withheld by leak detector");
            }
            ToolResponse::Success { replaced, .. } => {
                info!(replaced, "tool call complete, document redacted");
            }
            other => info!(kind = %other.kind(), ok = other.is_ok(), "tool call complete"),
        }
        Ok(response)
    }

    fn tool_document(&self, tool: &str, args: Vec<String>, mode: SafetyMode) -> ToolResponse {
        let result = self.runner.invoke(&self.invocation(args));
        self.assembler.assemble_document(tool, &result, mode)
    }

    fn tool_inspect(&self, params: &Map<String, Value>) -> Result<ToolResponse> {
        let spec_file = self.spec_file(params)?;
        let args = inspect_args(&self.config, &spec_file);
        Ok(self.tool_document(TOOL_INSPECT, args, self.config.safety_mode()))
    }

    fn tool_exec(&self, params: &Map<String, Value>) -> Result<ToolResponse> {
        check_exec_gate(self.exec_enabled)?;

        let command = params
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| GuardError::invalid_params("command must be a string"))?;
        check_allowlist(self.config.allowed_commands.as_deref(), command)?;

        let command_args = string_list(params, "args")?;
        let spec_file = self.spec_file(params)?;

        let args = exec_args(&self.config, &spec_file, command, &command_args);
        let result = self.runner.invoke(&self.invocation(args));
        Ok(self.assembler.assemble_execution(&result))
    }

    /// `specFile` param, then config, then the default.
    fn spec_file(&self, params: &Map<String, Value>) -> Result<PathBuf> {
        let spec_file = match params.get("specFile") {
            None | Some(Value::Null) => self.config.spec_file_or_default(),
            Some(Value::String(s)) => PathBuf::from(s),
            Some(_) => return Err(GuardError::invalid_params("specFile must be a string")),
        };
        check_relative_path("specFile", &spec_file)?;
        Ok(spec_file)
    }

    fn invocation(&self, args: Vec<String>) -> Invocation {
        Invocation::new(self.config.dotkc_bin.clone(), args, self.config.timeout())
    }
}

fn params_object(params: &Value) -> Result<Map<String, Value>> {
    match params {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        _ => Err(GuardError::invalid_params("params must be a JSON object")),
    }
}

fn string_list(params: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    GuardError::invalid_params(format!("{} must contain only strings", key))
                })
            })
            .collect(),
        Some(_) => Err(GuardError::invalid_params(format!("{} must be an array", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dk_redact::{ExternalResult, REDACTION_MARKER};
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns a fixed result and records every invocation.
    struct Scripted {
        result: ExternalResult,
        seen: Mutex<Vec<Invocation>>,
    }

    impl Scripted {
        fn new(code: i32, stdout: &str, stderr: &str) -> Self {
            Self {
                result: ExternalResult::new(code, stdout, stderr),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Invoke for Scripted {
        fn invoke(&self, invocation: &Invocation) -> ExternalResult {
            self.seen.lock().unwrap().push(invocation.clone());
            self.result.clone()
        }
    }

    fn context(config: PluginConfig, runner: Scripted) -> ToolContext<Scripted> {
        ToolContext::new(config, runner).with_exec_enabled(false)
    }

    fn exec_config() -> PluginConfig {
        PluginConfig {
            allowed_commands: Some(vec!["node".to_string()]),
            ..PluginConfig::default()
        }
    }

    fn parse(content: &[ToolContent]) -> Value {
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].content_type, "text");
        serde_json::from_str(&content[0].text).unwrap()
    }

    #[test]
    fn tool_definitions_have_valid_schemas() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 4);
        for def in &defs {
            assert!(def.name.starts_with("dotkc_"), "{}", def.name);
            assert!(!def.description.is_empty());
            assert_eq!(def.input_schema["type"], "object");
        }
        let exec = defs.iter().find(|d| d.name == TOOL_EXEC).unwrap();
        assert_eq!(exec.input_schema["required"], json!(["command"]));
    }

    #[test]
    fn tool_definition_serializes_camel_case() {
        let json = serde_json::to_value(&tool_definitions()[0]).unwrap();
        assert!(json.get("inputSchema").is_some());
    }

    #[test]
    fn test_status_invocation_and_redaction() {
        let runner = Scripted::new(0, r#"{"format":"openclaw","token":"abc","ok":true}"#, "");
        let config = PluginConfig {
            vault_path: Some(PathBuf::from("/v")),
            ..PluginConfig::default()
        };
        let ctx = context(config, runner);

        let json = parse(&ctx.call_tool(TOOL_STATUS, &json!({})));
        assert_eq!(json["token"], REDACTION_MARKER);
        assert_eq!(json["ok"], true);

        let calls = ctx.runner.calls();
        assert_eq!(calls[0].program, "dotkc");
        assert_eq!(calls[0].args, ["status", "--openclaw", "--vault", "/v"]);
        assert_eq!(calls[0].timeout.as_millis(), 30_000);
    }

    #[test]
    fn test_status_ignores_allow_unsafe() {
        let runner = Scripted::new(0, r#"{"format":"openclaw","secret":"abc"}"#, "");
        let config = PluginConfig {
            allow_unsafe: true,
            ..PluginConfig::default()
        };
        let json = parse(&context(config, runner).call_tool(TOOL_DOCTOR, &Value::Null));
        assert_eq!(json["secret"], REDACTION_MARKER);
    }

    #[test]
    fn test_inspect_uses_param_spec_file() {
        let runner = Scripted::new(0, r#"{"format":"openclaw","env":{"A":"b"}}"#, "");
        let ctx = context(PluginConfig::default(), runner);
        let json = parse(&ctx.call_tool(TOOL_INSPECT, &json!({ "specFile": "app.spec" })));
        assert_eq!(json["env"]["A"], REDACTION_MARKER);
        assert_eq!(
            ctx.runner.calls()[0].args,
            ["run", "--spec-file", "app.spec", "--openclaw"]
        );
    }

    #[test]
    fn test_inspect_defaults_spec_file() {
        let runner = Scripted::new(0, r#"{"format":"openclaw"}"#, "");
        let ctx = context(PluginConfig::default(), runner);
        ctx.call_tool(TOOL_INSPECT, &json!({}));
        assert_eq!(ctx.runner.calls()[0].args[2], "./dotkc.spec");
    }

    #[test]
    fn test_inspect_permissive_passes_values() {
        let runner = Scripted::new(0, r#"{"format":"openclaw","env":{"A":"b"}}"#, "");
        let config = PluginConfig {
            allow_unsafe: true,
            ..PluginConfig::default()
        };
        let ctx = context(config, runner);
        let json = parse(&ctx.call_tool(TOOL_INSPECT, &json!({})));
        assert_eq!(json["env"]["A"], "b");
        assert_eq!(ctx.runner.calls()[0].args[1], "--unsafe-values");
    }

    #[test]
    fn test_inspect_rejects_traversal_without_running() {
        let ctx = context(PluginConfig::default(), Scripted::new(0, "", ""));
        let err = ctx
            .call(TOOL_INSPECT, &json!({ "specFile": "../../etc/dotkc.spec" }))
            .unwrap_err();
        assert!(matches!(err, GuardError::UnsafePath { .. }));
        assert!(ctx.runner.calls().is_empty());
    }

    #[test]
    fn test_inspect_rejects_non_string_spec_file() {
        let ctx = context(PluginConfig::default(), Scripted::new(0, "", ""));
        let json = parse(&ctx.call_tool(TOOL_INSPECT, &json!({ "specFile": 7 })));
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], 10);
    }

    #[test]
    fn test_exec_requires_gate() {
        let ctx = context(exec_config(), Scripted::new(0, "", ""));
        let err = ctx.call(TOOL_EXEC, &json!({ "command": "node" })).unwrap_err();
        assert!(matches!(err, GuardError::ExecDisabled));
        assert!(ctx.runner.calls().is_empty());
    }

    #[test]
    fn test_exec_requires_allowlist() {
        let ctx =
            context(PluginConfig::default(), Scripted::new(0, "", "")).with_exec_enabled(true);
        let err = ctx.call(TOOL_EXEC, &json!({ "command": "node" })).unwrap_err();
        assert!(matches!(err, GuardError::MissingAllowlist));

        let ctx = context(exec_config(), Scripted::new(0, "", "")).with_exec_enabled(true);
        let err = ctx.call(TOOL_EXEC, &json!({ "command": "bash" })).unwrap_err();
        assert!(matches!(err, GuardError::CommandNotAllowed(_)));
        assert!(ctx.runner.calls().is_empty());
    }

    #[test]
    fn test_exec_summary() {
        let runner = Scripted::new(0, "listening on 3000\n", "");
        let ctx = context(exec_config(), runner).with_exec_enabled(true);
        let json = parse(&ctx.call_tool(
            TOOL_EXEC,
            &json!({ "command": "node", "args": ["server.js"] }),
        ));
        assert_eq!(json["ok"], true);
        assert_eq!(json["stdoutTail"], "listening on 3000\n");
        assert_eq!(
            ctx.runner.calls()[0].args,
            ["run", "--spec-file", "./dotkc.spec", "--", "node", "server.js"]
        );
    }

    #[test]
    fn test_exec_output_blocked() {
        let runner = Scripted::new(0, "DATABASE_URL=postgres://u:p@h/db\n", "");
        let ctx = context(exec_config(), runner).with_exec_enabled(true);
        let response = ctx.call(TOOL_EXEC, &json!({ "command": "node" })).unwrap();
        assert_eq!(response.kind(), dk_redact::ResponseKind::Blocked);
        assert!(!response.render().contains("postgres://"));
    }

    #[test]
    fn test_exec_rejects_bad_args() {
        let ctx = context(exec_config(), Scripted::new(0, "", "")).with_exec_enabled(true);
        let err = ctx
            .call(TOOL_EXEC, &json!({ "command": "node", "args": ["ok", 1] }))
            .unwrap_err();
        assert!(matches!(err, GuardError::InvalidParams(_)));

        let err = ctx.call(TOOL_EXEC, &json!({ "args": [] })).unwrap_err();
        assert!(matches!(err, GuardError::InvalidParams(_)));
    }

    #[test]
    fn test_unknown_tool() {
        let ctx = context(PluginConfig::default(), Scripted::new(0, "", ""));
        let json = parse(&ctx.call_tool("dotkc_rotate", &json!({})));
        assert_eq!(json["ok"], false);
        assert!(json["error"].as_str().unwrap().contains("dotkc_rotate"));
    }

    #[test]
    fn test_params_must_be_object() {
        let ctx = context(PluginConfig::default(), Scripted::new(0, "", ""));
        let err = ctx.call(TOOL_STATUS, &json!(["x"])).unwrap_err();
        assert!(matches!(err, GuardError::InvalidParams(_)));
    }

    #[test]
    fn test_failure_carries_exit_code() {
        let runner = Scripted::new(4, "", "vault is locked");
        let ctx = context(PluginConfig::default(), runner);
        let json = parse(&ctx.call_tool(TOOL_STATUS, &json!({})));
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], 4);
        assert_eq!(json["stderr"], "vault is locked");
    }

    #[test]
    fn test_detector_policy_from_config() {
        let runner = Scripted::new(0, r#"{"format":"openclaw","note":"acme_live_123"}"#, "");
        let mut config = PluginConfig::default();
        config.detector.token_prefixes.push("acme_live_".to_string());
        let json = parse(&context(config, runner).call_tool(TOOL_STATUS, &json!({})));
        assert_eq!(json["code"], 2);
    }
}
