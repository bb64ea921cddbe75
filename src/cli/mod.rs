// Copyright 2024-2026 Sentinel CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for Sentinel CORE commands.
//!
//! Every command runs in-process; there is no server to connect to.
//!
//! ## Usage
//!
//! ```bash
//! sentinel-core-cli explain incident.json --replay replay.json
//! sentinel-core-cli selftest 50 --json
//! sentinel-core-cli config show
//! sentinel-core-cli diagnostics
//! ```

pub mod config_cmd;
pub mod explain_cmd;
pub mod selftest_cmd;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

pub use explain_cmd::{run_diagnostics, run_explain};
pub use selftest_cmd::run_selftest;

/// Exit code for bad arguments or configuration.
pub const EXIT_USAGE: u8 = 2;
/// Exit code when the engine could not be brought up.
pub const EXIT_ENGINE: u8 = 3;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Task failed: {0}")]
    Task(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::Config(_) => EXIT_USAGE,
            Self::Engine(_) => EXIT_ENGINE,
            Self::Io { .. } | Self::Json(_) | Self::Task(_) => 1,
        }
    }
}

/// Value following `flag`, e.g. `--replay file.json`.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// First argument that is neither a flag nor a flag's value.
pub fn positional<'a>(args: &'a [String], value_flags: &[&str]) -> Option<&'a str> {
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if value_flags.contains(&arg.as_str()) {
            skip = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["--replay", "r.json", "--json"]);
        assert_eq!(flag_value(&a, "--replay"), Some("r.json"));
        assert_eq!(flag_value(&a, "--json"), None);
        assert_eq!(flag_value(&a, "--model"), None);
        assert!(has_flag(&a, "--json"));
    }

    #[test]
    fn test_positional_skips_flag_values() {
        let a = args(&["--replay", "r.json", "incident.json", "--json"]);
        assert_eq!(positional(&a, &["--replay"]), Some("incident.json"));
        assert_eq!(positional(&args(&["--json"]), &[]), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), EXIT_USAGE);
        assert_eq!(CliError::Engine(EngineError::ModelLoad("x".into())).exit_code(), EXIT_ENGINE);
    }
}
