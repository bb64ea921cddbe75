//! Deterministic generator: the path that always produces an answer.

use super::answer::{ActionStep, Attribution, ExplanationAnswer};
use super::fragments;
use super::render::{compose, Selection};
use crate::incident::Incident;
use crate::slots::{ActionCategory, MAX_ACTIONS, MAX_REASON_IDS};

/// Produces an answer from the incident alone. Must never fail.
pub trait DeterministicGenerator: Send + Sync {
    /// Returned answers carry `Attribution::Deterministic`; the pipeline
    /// relabels them when they stand in for a failed model attempt.
    fn generate(&self, incident: &Incident) -> ExplanationAnswer;
}

/// Rule table generator: strongest evidence first, actions suggested per
/// evidence kind, then the category baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    pub fn new() -> Self {
        Self
    }

    fn select_actions(incident: &Incident) -> Vec<ActionCategory> {
        let severity = incident.severity;
        let mut actions: Vec<ActionCategory> = Vec::with_capacity(MAX_ACTIONS);
        let by_kind = incident
            .evidence_by_strength()
            .into_iter()
            .map(|e| fragments::suggested_action(e.kind));
        let baseline = fragments::category_actions(incident.category).iter().rev().copied();

        for action in by_kind.chain(baseline) {
            if actions.len() == MAX_ACTIONS {
                break;
            }
            if action.allowed_at(severity) && !actions.contains(&action) {
                actions.push(action);
            }
        }
        if actions.is_empty() {
            actions.push(ActionCategory::MonitorActivity);
        }
        actions
    }
}

impl DeterministicGenerator for RuleBasedGenerator {
    fn generate(&self, incident: &Incident) -> ExplanationAnswer {
        let reason_ids: Vec<String> = incident
            .evidence_by_strength()
            .into_iter()
            .take(MAX_REASON_IDS)
            .map(|e| e.id.clone())
            .collect();
        let actions = Self::select_actions(incident);

        let selection = Selection {
            severity: incident.severity,
            reason_ids: &reason_ids,
            actions: &actions,
            ignore_reason: None,
            confidence: 1.0,
        };
        compose(incident, &selection, Attribution::Deterministic)
            .unwrap_or_else(|_| minimal_answer(incident))
    }
}

/// Answer for incidents with no usable evidence.
pub fn minimal_answer(incident: &Incident) -> ExplanationAnswer {
    let action = ActionCategory::MonitorActivity;
    ExplanationAnswer {
        incident_id: incident.id.clone(),
        severity: incident.severity,
        summary: fragments::summary(incident, incident.severity),
        reasons: Vec::new(),
        actions: vec![ActionStep { category: action, text: fragments::action_text(action).to_string() }],
        ignore_guidance: None,
        confidence: 1.0,
        attribution: Attribution::Deterministic,
        notice: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{Evidence, EvidenceKind, IncidentCategory, Severity};

    fn incident(severity: Severity, kinds: &[(EvidenceKind, Severity)]) -> Incident {
        Incident {
            id: "inc-d".into(),
            category: IncidentCategory::DeviceIntegrity,
            severity,
            subject: None,
            evidence: kinds
                .iter()
                .enumerate()
                .map(|(i, (kind, sev))| Evidence {
                    id: format!("ev-{i}"),
                    kind: *kind,
                    severity: *sev,
                    label: None,
                })
                .collect(),
        }
    }

    #[test]
    fn never_recommends_actions_above_severity() {
        let inc = incident(Severity::High, &[(EvidenceKind::RootIndicator, Severity::High)]);
        let answer = RuleBasedGenerator.generate(&inc);
        assert!(!answer.has_action(ActionCategory::FactoryReset));
        assert!(answer.actions.iter().all(|a| a.category.allowed_at(Severity::High)));
        assert_eq!(answer.severity, Severity::High);
        assert_eq!(answer.attribution, Attribution::Deterministic);
    }

    #[test]
    fn strongest_evidence_leads() {
        let inc = incident(
            Severity::Medium,
            &[(EvidenceKind::OutdatedSystem, Severity::Low), (EvidenceKind::RootIndicator, Severity::Medium)],
        );
        let answer = RuleBasedGenerator.generate(&inc);
        assert_eq!(answer.reasons[0].evidence_id, "ev-1");
        assert_eq!(answer.actions[0].category, ActionCategory::ContactSupport);
    }

    #[test]
    fn incident_without_evidence_still_answers() {
        let inc = incident(Severity::Low, &[]);
        let answer = RuleBasedGenerator.generate(&inc);
        assert!(answer.reasons.is_empty());
        assert_eq!(answer.actions.len(), 1);
    }
}
