// Copyright 2024-2026 Sentinel CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! `selftest` subcommand.

use std::sync::Arc;

use super::config_cmd::load_config;
use super::explain_cmd::build_pipeline;
use super::{flag_value, has_flag, positional, CliError};
use crate::selftest::{fixtures, SelfTestHarness, DEFAULT_SEED};

const DEFAULT_RUNS: usize = 20;
const VALUE_FLAGS: &[&str] = &["--seed", "--replay", "--model", "--config"];

/// `selftest [RUNS] [--seed N] [--json] [--model FILE]`
///
/// Without `--model` or `--replay` the built-in fixtures answer with their
/// recorded output.
pub async fn run_selftest(args: &[String]) -> Result<i32, CliError> {
    let runs = match positional(args, VALUE_FLAGS) {
        Some(n) => n
            .parse::<usize>()
            .map_err(|_| CliError::Usage(format!("invalid run count '{n}'")))?,
        None => DEFAULT_RUNS,
    };
    let seed = match flag_value(args, "--seed") {
        Some(s) => s
            .parse::<u64>()
            .map_err(|_| CliError::Usage(format!("invalid seed '{s}'")))?,
        None => DEFAULT_SEED,
    };

    let config = load_config(args)?;
    let external = flag_value(args, "--replay").is_some() || flag_value(args, "--model").is_some();
    let harness = if external {
        let pipeline = build_pipeline(&config, args)?;
        SelfTestHarness::new(Arc::new(pipeline), fixtures::builtin())
    } else {
        SelfTestHarness::with_replay(config.pipeline_config())?
    }
    .with_seed(seed);

    let report = tokio::task::spawn_blocking(move || {
        let report = harness.run(runs);
        harness.pipeline().detach_engine();
        report
    })
    .await
    .map_err(|e| CliError::Task(e.to_string()))?;

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(0)
}
