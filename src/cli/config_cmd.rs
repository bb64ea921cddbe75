// Copyright 2024-2026 Sentinel CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, validate.

use std::path::Path;

use super::CliError;
use crate::config::{self, ExplainConfig};

/// Environment config, or a file with environment overrides when
/// `--config FILE` is given.
pub fn load_config(args: &[String]) -> Result<ExplainConfig, CliError> {
    match super::flag_value(args, "--config") {
        Some(path) => Ok(ExplainConfig::load_with_file(Path::new(path))?),
        None => Ok(config::load()),
    }
}

/// Print the effective config as TOML, or JSON with `--json`.
pub fn run_show(args: &[String]) -> Result<(), CliError> {
    let cfg = load_config(args)?;
    if super::has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    } else {
        print!("{}", cfg.to_toml_string()?);
        println!("# worst-case call: {} ms", cfg.worst_case_call_ms());
    }
    Ok(())
}

/// Validate configuration. Returns 0 if valid, 1 otherwise.
pub fn run_validate(args: &[String]) -> Result<i32, CliError> {
    let cfg = load_config(args)?;
    let mut warnings = 0;

    if let Err(e) = cfg.validate() {
        eprintln!("ERROR: {e}");
        return Ok(1);
    }
    if cfg.engine.cancel_cooldown_ms == 0 {
        eprintln!("WARNING: cancel_cooldown_ms is 0; a timed-out decode may still hold the model");
        warnings += 1;
    }
    if let Some(path) = &cfg.engine.model_path {
        if !path.exists() {
            eprintln!("WARNING: model file {} does not exist", path.display());
            warnings += 1;
        }
    }

    if warnings == 0 {
        println!("Configuration is valid.");
        Ok(0)
    } else {
        Ok(1)
    }
}
