//! dotkc-guard CLI.
//!
//! Runs the guarded dotkc tools from a shell and exposes the leak detector
//! and redactor as standalone filters. Tool payloads go to stdout; logs go
//! to stderr.

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use dk_config::{load_config, PluginConfig};
use dk_core::exit_codes::ExitCode;
use dk_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use dk_core::tools::{TOOL_DOCTOR, TOOL_EXEC, TOOL_INSPECT, TOOL_STATUS};
use dk_core::{tool_definitions, GuardError, ToolContext};
use dk_redact::{parse_json, redact, LeakDetector, SafetyMode, ToolResponse};
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, warn};

/// Guarded dotkc tools for agent runtimes
#[derive(Parser)]
#[command(name = "dk-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.json (or a host document with a plugins section)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the dotkc executable
    #[arg(long, global = true)]
    dotkc_bin: Option<String>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show vault status (redacted)
    Status,

    /// Run dotkc doctor diagnostics (redacted)
    Doctor,

    /// Resolve a spec file and print a redacted env preview
    Inspect(InspectArgs),

    /// Run an allowlisted command with injected secrets
    Exec(ExecArgs),

    /// Print tool definitions as JSON
    Tools,

    /// Run the leak detector over a file or stdin
    Scan(InputArgs),

    /// Strictly redact a JSON document from a file or stdin
    Redact(InputArgs),

    /// Call a tool by name with JSON params
    Call(CallArgs),
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Spec file to resolve (default: config specFile or ./dotkc.spec)
    #[arg(long)]
    spec_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Spec file to resolve (default: config specFile or ./dotkc.spec)
    #[arg(long)]
    spec_file: Option<PathBuf>,

    /// Command and arguments, after `--`
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input file (default: stdin)
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Tool name
    tool: String,

    /// Params as a JSON object
    #[arg(long)]
    params: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::ArgsError,
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = info_span!("dk_core", run_id = %run_id);
    let _enter = span.enter();

    let exit_code = run(&cli);
    if exit_code.is_internal_error() {
        error!(exit_code = %exit_code, "exiting with error");
    } else if exit_code.is_user_error() {
        warn!(exit_code = %exit_code, "request refused");
    } else {
        debug!(exit_code = %exit_code, "exiting");
    }
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli) -> ExitCode {
    let config = match resolve_plugin_config(&cli.global) {
        Ok(config) => config,
        Err(e) => return emit_error(&e),
    };

    match &cli.command {
        Commands::Status => run_tool(config, TOOL_STATUS, json!({})),
        Commands::Doctor => run_tool(config, TOOL_DOCTOR, json!({})),
        Commands::Inspect(args) => {
            let mut params = json!({});
            if let Some(spec) = &args.spec_file {
                params["specFile"] = json!(spec.to_string_lossy());
            }
            run_tool(config, TOOL_INSPECT, params)
        }
        Commands::Exec(args) => {
            let Some((command, rest)) = args.command.split_first() else {
                return emit_error(&GuardError::invalid_params("missing command after --"));
            };
            let mut params = json!({ "command": command, "args": rest });
            if let Some(spec) = &args.spec_file {
                params["specFile"] = json!(spec.to_string_lossy());
            }
            run_tool(config, TOOL_EXEC, params)
        }
        Commands::Tools => emit(&json!(tool_definitions())),
        Commands::Scan(args) => run_scan(&config, args.file.as_deref()),
        Commands::Redact(args) => run_redact(args.file.as_deref()),
        Commands::Call(args) => {
            let parsed = args
                .params
                .as_deref()
                .map(|raw| serde_json::from_str::<Value>(raw));
            let params = match parsed {
                None => json!({}),
                Some(Ok(params)) => params,
                Some(Err(e)) => {
                    return emit_error(&GuardError::invalid_params(format!(
                        "--params is not valid JSON: {}",
                        e
                    )))
                }
            };
            run_tool(config, &args.tool, params)
        }
    }
}

/// Load and validate config, then apply CLI overrides.
fn resolve_plugin_config(global: &GlobalOpts) -> Result<PluginConfig, GuardError> {
    let loaded = load_config(global.config.as_deref())?;
    info!(
        source = %loaded.source,
        path = ?loaded.path,
        "configuration loaded"
    );

    let mut config = loaded.config;
    if let Some(bin) = &global.dotkc_bin {
        if bin.trim().is_empty() {
            return Err(GuardError::invalid_params("--dotkc-bin must not be empty"));
        }
        config.dotkc_bin = bin.clone();
    }
    Ok(config)
}

fn run_tool(config: PluginConfig, name: &str, params: Value) -> ExitCode {
    let ctx = ToolContext::from_config(config);
    match ctx.call(name, &params) {
        Ok(response) => {
            println!("{}", response.render());
            ExitCode::for_response(&response)
        }
        Err(e) => emit_error(&e),
    }
}

fn run_scan(config: &PluginConfig, file: Option<&Path>) -> ExitCode {
    let text = match read_input(file) {
        Ok(text) => text,
        Err(e) => return emit_error(&e),
    };

    let detector = LeakDetector::new(config.detector.clone());
    let parsed = parse_json(&text).ok();
    let reasons = detector.detect(&text, "", parsed.as_ref());
    info!(
        bytes = text.len(),
        json = parsed.is_some(),
        reasons = reasons.len(),
        "scan complete"
    );

    let emitted = emit(&json!({ "ok": reasons.is_empty(), "reasons": reasons }));
    if !emitted.is_success() {
        emitted
    } else if reasons.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::LeakBlocked
    }
}

fn run_redact(file: Option<&Path>) -> ExitCode {
    let text = match read_input(file) {
        Ok(text) => text,
        Err(e) => return emit_error(&e),
    };

    match parse_json(&text) {
        Ok(doc) => emit(&redact(&doc, SafetyMode::Strict)),
        Err(e) => emit_error(&GuardError::invalid_params(format!(
            "input is not JSON: {}",
            e
        ))),
    }
}

fn read_input(file: Option<&Path>) -> Result<String, GuardError> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Print a JSON value to stdout; a value that will not serialize is an internal error.
fn emit(value: &Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Success
        }
        Err(e) => {
            error!(error = %e, "failed to render output");
            ExitCode::InternalError
        }
    }
}

/// Print a refusal as the structured failure shape and map it to an exit code.
fn emit_error(err: &GuardError) -> ExitCode {
    let response: ToolResponse = err.to_response();
    println!("{}", response.render());
    err.exit_code()
}
