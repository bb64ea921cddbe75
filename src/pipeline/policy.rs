//! Final policy pass applied to every answer, model or deterministic.
//!
//! Idempotent: applying it to its own output changes nothing.

use thiserror::Error;

use super::answer::{ActionStep, ExplanationAnswer};
use super::fragments;
use crate::incident::Severity;
use crate::slots::{ActionCategory, MAX_ACTIONS, MAX_REASON_IDS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("No permissible action remains at {0} severity")]
    NoActions(Severity),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyCheck;

impl PolicyCheck {
    pub fn new() -> Self {
        Self
    }

    /// Remove disproportionate actions, ignore guidance on serious incidents,
    /// and anything past the list caps. Fails if no action is left.
    pub fn apply(&self, answer: ExplanationAnswer) -> Result<ExplanationAnswer, PolicyViolation> {
        let answer = self.clean(answer);
        if answer.actions.is_empty() {
            return Err(PolicyViolation::NoActions(answer.severity));
        }
        Ok(answer)
    }

    /// `apply` for the deterministic path: an empty action list gets the
    /// always-permitted monitoring step instead of failing.
    pub fn enforce(&self, answer: ExplanationAnswer) -> ExplanationAnswer {
        let mut answer = self.clean(answer);
        if answer.actions.is_empty() {
            let action = ActionCategory::MonitorActivity;
            answer.actions.push(ActionStep {
                category: action,
                text: fragments::action_text(action).to_string(),
            });
        }
        answer
    }

    fn clean(&self, mut answer: ExplanationAnswer) -> ExplanationAnswer {
        let severity = answer.severity;

        answer.actions.retain(|a| a.category.allowed_at(severity));
        let mut seen: Vec<ActionCategory> = Vec::with_capacity(answer.actions.len());
        answer.actions.retain(|a| {
            let fresh = !seen.contains(&a.category);
            seen.push(a.category);
            fresh
        });
        answer.actions.truncate(MAX_ACTIONS);
        answer.reasons.truncate(MAX_REASON_IDS);

        if severity >= Severity::High {
            answer.ignore_guidance = None;
        }
        answer.confidence = if answer.confidence.is_finite() {
            answer.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::answer::{Attribution, ReasonLine};

    fn step(category: ActionCategory) -> ActionStep {
        ActionStep { category, text: fragments::action_text(category).to_string() }
    }

    fn answer(severity: Severity, actions: &[ActionCategory]) -> ExplanationAnswer {
        ExplanationAnswer {
            incident_id: "inc-p".into(),
            severity,
            summary: "s".into(),
            reasons: (0..7)
                .map(|i| ReasonLine { evidence_id: format!("ev-{i}"), text: "t".into() })
                .collect(),
            actions: actions.iter().copied().map(step).collect(),
            ignore_guidance: Some("ignore".into()),
            confidence: 1.3,
            attribution: Attribution::ModelAssisted,
            notice: None,
        }
    }

    #[test]
    fn removes_disproportionate_actions_and_ignore_guidance() {
        let checked = PolicyCheck
            .apply(answer(Severity::High, &[ActionCategory::FactoryReset, ActionCategory::DisconnectNetwork]))
            .unwrap();
        assert!(!checked.has_action(ActionCategory::FactoryReset));
        assert!(checked.has_action(ActionCategory::DisconnectNetwork));
        assert!(checked.ignore_guidance.is_none());
        assert_eq!(checked.reasons.len(), MAX_REASON_IDS);
        assert_eq!(checked.confidence, 1.0);
    }

    #[test]
    fn is_idempotent() {
        let once = PolicyCheck
            .apply(answer(Severity::Low, &[ActionCategory::UpdateApp, ActionCategory::UpdateApp]))
            .unwrap();
        let twice = PolicyCheck.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.actions.len(), 1);
        assert!(once.ignore_guidance.is_some());
    }

    #[test]
    fn empty_action_list_fails_apply_but_not_enforce() {
        let a = answer(Severity::Medium, &[ActionCategory::FactoryReset]);
        assert_eq!(PolicyCheck.apply(a.clone()), Err(PolicyViolation::NoActions(Severity::Medium)));
        let enforced = PolicyCheck.enforce(a);
        assert_eq!(enforced.actions.len(), 1);
        assert!(enforced.has_action(ActionCategory::MonitorActivity));
    }
}
