//! Turns selected keys into an answer using pre-authored fragments.

use thiserror::Error;

use super::answer::{ActionStep, Attribution, ExplanationAnswer, ReasonLine};
use super::fragments;
use crate::incident::{Incident, Severity};
use crate::slots::{ActionCategory, IgnoreReason};
use crate::validator::ValidatedSlots;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Evidence id '{0}' not in incident")]
    UnknownEvidence(String),

    #[error("No evidence to explain")]
    NoReasons,
}

/// Keys selected for one answer, by the model or by rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
    pub severity: Severity,
    pub reason_ids: &'a [String],
    pub actions: &'a [ActionCategory],
    pub ignore_reason: Option<IgnoreReason>,
    pub confidence: f64,
}

pub fn compose(
    incident: &Incident,
    selection: &Selection<'_>,
    attribution: Attribution,
) -> Result<ExplanationAnswer, RenderError> {
    if selection.reason_ids.is_empty() {
        return Err(RenderError::NoReasons);
    }

    let reasons = selection
        .reason_ids
        .iter()
        .map(|id| {
            let evidence = incident
                .evidence_by_id(id)
                .ok_or_else(|| RenderError::UnknownEvidence(id.clone()))?;
            let base = fragments::evidence_text(evidence.kind);
            let text = match evidence.label.as_deref().map(fragments::display_label) {
                Some(label) if !label.is_empty() => format!("{base} ({label})"),
                _ => base.to_string(),
            };
            Ok(ReasonLine { evidence_id: id.clone(), text })
        })
        .collect::<Result<Vec<_>, RenderError>>()?;

    let actions = selection
        .actions
        .iter()
        .map(|&category| ActionStep { category, text: fragments::action_text(category).to_string() })
        .collect();

    Ok(ExplanationAnswer {
        incident_id: incident.id.clone(),
        severity: selection.severity,
        summary: fragments::summary(incident, selection.severity),
        reasons,
        actions,
        ignore_guidance: selection.ignore_reason.map(|r| fragments::ignore_text(r).to_string()),
        confidence: selection.confidence,
        attribution,
        notice: None,
    })
}

/// Render validated model slots.
pub fn render_slots(incident: &Incident, slots: &ValidatedSlots) -> Result<ExplanationAnswer, RenderError> {
    let selection = Selection {
        severity: slots.assessed_severity(),
        reason_ids: slots.reason_ids(),
        actions: slots.actions(),
        ignore_reason: slots.ignore_reason(),
        confidence: slots.confidence(),
    };
    compose(incident, &selection, Attribution::ModelAssisted)
}
