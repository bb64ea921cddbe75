// Copyright 2024-2026 Sentinel CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! `explain` and `diagnostics` subcommands.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use super::config_cmd::load_config;
use super::{flag_value, has_flag, positional, CliError};
use crate::config::ExplainConfig;
use crate::engine::{ExecutionCore, NativeBackend, ReplayBackend};
use crate::incident::Incident;
use crate::pipeline::{ExplainRequest, ExplainService, ExplanationAnswer, ExplanationPipeline, Locale};
use crate::validator::ValidationMode;

const VALUE_FLAGS: &[&str] = &["--replay", "--model", "--config", "--locale"];

/// Build a pipeline with whichever engine the arguments and config select.
///
/// `--replay FILE` wins over `--model FILE`, which wins over the configured
/// model path. With none of them the pipeline runs deterministic only.
pub fn build_pipeline(config: &ExplainConfig, args: &[String]) -> Result<ExplanationPipeline, CliError> {
    let pipeline = ExplanationPipeline::new(config.pipeline_config());

    let backend: Option<Box<dyn NativeBackend>> = if let Some(replay) = flag_value(args, "--replay") {
        Some(Box::new(ReplayBackend::from_file(Path::new(replay))?))
    } else if let Some(model) = flag_value(args, "--model").map(Path::new).or(config.engine.model_path.as_deref()) {
        Some(load_model(config, model)?)
    } else {
        None
    };

    match backend {
        Some(backend) => {
            let engine = ExecutionCore::new(backend, config.tuning(), config.parser)?;
            tracing::info!(engine_id = engine.engine_id(), handle = %engine.handle(), "engine attached");
            Ok(pipeline.with_engine(Arc::new(engine)))
        }
        None => Ok(pipeline),
    }
}

#[cfg(feature = "gguf")]
fn load_model(config: &ExplainConfig, path: &Path) -> Result<Box<dyn NativeBackend>, CliError> {
    let session = crate::engine::GgufSession::load(path, config.gguf_options())?;
    Ok(Box::new(session))
}

#[cfg(not(feature = "gguf"))]
fn load_model(_config: &ExplainConfig, path: &Path) -> Result<Box<dyn NativeBackend>, CliError> {
    Err(CliError::Usage(format!(
        "cannot load {}: built without the `gguf` feature",
        path.display()
    )))
}

fn read_incident(path: &str) -> Result<Incident, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| CliError::Io { path: path.into(), source })?;
    Ok(serde_json::from_str(&text)?)
}

fn apply_overrides(config: &mut ExplainConfig, args: &[String]) -> Result<(), CliError> {
    if has_flag(args, "--strict") {
        config.pipeline.validation_mode = ValidationMode::Strict;
    }
    if let Some(locale) = flag_value(args, "--locale") {
        config.pipeline.locale = locale.parse::<Locale>().map_err(CliError::Usage)?;
    }
    Ok(())
}

/// `explain <incident.json> [--replay FILE] [--model FILE] [--config FILE]
/// [--locale TAG] [--strict] [--json]`
pub async fn run_explain(args: &[String]) -> Result<i32, CliError> {
    let path = positional(args, VALUE_FLAGS)
        .ok_or_else(|| CliError::Usage("explain requires an incident JSON file".into()))?;
    let incident = read_incident(path)?;

    let mut config = load_config(args)?;
    apply_overrides(&mut config, args)?;
    let pipeline = Arc::new(build_pipeline(&config, args)?);
    let service = ExplainService::new(Arc::clone(&pipeline));

    let answer = service.explain(ExplainRequest::new(incident)).await;
    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print!("{}", render_answer(&answer));
    }

    if let Some(outcome) = pipeline.detach_engine() {
        tracing::debug!(?outcome, "engine unloaded");
    }
    Ok(0)
}

/// `diagnostics [--replay FILE] [--model FILE] [--config FILE]`
pub fn run_diagnostics(args: &[String]) -> Result<i32, CliError> {
    let config = load_config(args)?;
    let pipeline = build_pipeline(&config, args)?;
    println!("{}", serde_json::to_string_pretty(&pipeline.diagnostics())?);
    pipeline.detach_engine();
    Ok(0)
}

pub fn render_answer(answer: &ExplanationAnswer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", answer.summary);
    if !answer.reasons.is_empty() {
        let _ = writeln!(out, "\nWhy:");
        for reason in &answer.reasons {
            let _ = writeln!(out, "  - {}", reason.text);
        }
    }
    let _ = writeln!(out, "\nWhat to do:");
    for (i, action) in answer.actions.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, action.text);
    }
    if let Some(guidance) = &answer.ignore_guidance {
        let _ = writeln!(out, "\n{guidance}");
    }
    if let Some(notice) = &answer.notice {
        let _ = writeln!(out, "\nNote: {notice}");
    }
    let _ = writeln!(out, "\n[{} | severity {} | confidence {:.2}]", answer.attribution.as_str(), answer.severity, answer.confidence);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Attribution, RuleBasedGenerator, DeterministicGenerator};
    use crate::incident::{Evidence, EvidenceKind, IncidentCategory, Severity};

    fn incident() -> Incident {
        Incident {
            id: "inc-cli".into(),
            category: IncidentCategory::SuspiciousApp,
            severity: Severity::Medium,
            subject: Some("Torch".into()),
            evidence: vec![Evidence {
                id: "ev-1".into(),
                kind: EvidenceKind::DangerousPermission,
                severity: Severity::Medium,
                label: None,
            }],
        }
    }

    #[test]
    fn test_render_answer_lists_actions() {
        let answer = RuleBasedGenerator.generate(&incident());
        let text = render_answer(&answer);
        assert!(text.contains("What to do:"));
        assert!(text.contains("  1. "));
        assert!(text.contains("deterministic"));
    }

    #[test]
    fn test_pipeline_without_engine() {
        let pipeline = build_pipeline(&ExplainConfig::default(), &[]).unwrap();
        assert!(pipeline.diagnostics().engine.is_none());
        let answer = pipeline.explain(&ExplainRequest::new(incident()));
        assert_eq!(answer.attribution, Attribution::Deterministic);
    }

    #[test]
    fn test_missing_replay_file_is_engine_error() {
        let args = vec!["--replay".to_string(), "/nonexistent/replay.json".to_string()];
        let err = build_pipeline(&ExplainConfig::default(), &args).err().unwrap();
        assert!(matches!(err, CliError::Engine(_)));
    }

    #[test]
    fn test_overrides() {
        let mut cfg = ExplainConfig::default();
        let args = vec!["--strict".to_string(), "--locale".to_string(), "de".to_string()];
        apply_overrides(&mut cfg, &args).unwrap();
        assert_eq!(cfg.pipeline.validation_mode, ValidationMode::Strict);
        assert_eq!(cfg.pipeline.locale, Locale::De);
        let bad = vec!["--locale".to_string(), "xx".to_string()];
        assert!(matches!(apply_overrides(&mut cfg, &bad), Err(CliError::Usage(_))));
    }
}
