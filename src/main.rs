// Copyright 2024-2026 Sentinel CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sentinel CORE command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `explain <incident.json>` - Explain one incident
//! - `selftest [runs]` - Run the self-test harness
//! - `config show|validate` - Inspect configuration
//! - `diagnostics` - Print the pipeline and engine snapshot

use std::process::ExitCode;

use sentinel_core::cli::{self, config_cmd, CliError};
use sentinel_core::config;
use sentinel_core::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest: &[String] = args.get(2..).unwrap_or(&[]);

    if needs_logging(command) {
        // Logging failure is not fatal for a CLI run.
        if let Err(e) = init_logging(&config::load().log_config()) {
            eprintln!("Logging disabled: {}", e);
        }
    }

    let result = match command {
        "explain" => cli::run_explain(rest).await,
        "selftest" => cli::run_selftest(rest).await,
        "diagnostics" => cli::run_diagnostics(rest),
        "config" => run_config(rest),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(0)
        }
        "version" | "--version" | "-V" => {
            println!("sentinel-core {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            Err(CliError::Usage(format!("unknown command '{command}'")))
        }
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn needs_logging(command: &str) -> bool {
    matches!(command, "explain" | "selftest" | "diagnostics")
}

fn run_config(args: &[String]) -> Result<i32, CliError> {
    let subcommand = args.first().map(|s| s.as_str()).unwrap_or("show");
    let rest = &args[args.len().min(1)..];
    match subcommand {
        "show" => config_cmd::run_show(rest).map(|_| 0),
        "validate" => config_cmd::run_validate(rest),
        _ => {
            eprintln!("Unknown config subcommand: {}", subcommand);
            print_usage();
            Err(CliError::Usage(format!("unknown config subcommand '{subcommand}'")))
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "sentinel-core - On-device incident explanation runtime v{}

USAGE:
    sentinel-core-cli <COMMAND> [OPTIONS]

COMMANDS:
    explain <INCIDENT.json>   Explain an incident; always prints an answer
    selftest [RUNS]           Explain the built-in fixtures RUNS times (default 20)
    config show|validate      Print effective values or check them
    diagnostics               Print the pipeline and engine snapshot as JSON
    version                   Show version information
    help                      Show this help message

OPTIONS:
    --replay FILE   Answer with a recorded replay script instead of a model
    --model FILE    Load a GGUF model (requires the gguf feature)
    --config FILE   Load configuration from a TOML file
    --locale TAG    Notice language, explain only (en, de)
    --strict        Strict slot validation, explain only
    --seed N        Fixture shuffle seed, selftest only
    --json          Print JSON instead of text

ENVIRONMENT:
    SENTINEL_MODEL_PATH        GGUF model file (requires the gguf feature)
    SENTINEL_TIMEOUT_MS        Native call deadline (default: 8000)
    SENTINEL_VALIDATION_MODE   lenient or strict (default: lenient)
    SENTINEL_LOG_LEVEL         Log filter (default: info)
    SENTINEL_LOG_FORMAT        json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure
    2  Usage or configuration error
    3  Engine could not be loaded
",
        version
    );
}
