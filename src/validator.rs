//! Slot validator: checks model slots against the incident they explain.
//!
//! Lenient mode repairs what it safely can (drop, clamp, truncate); strict
//! mode rejects instead. Some violations are never repairable: NaN
//! confidence, no surviving evidence, actions out of proportion to the
//! incident severity, and severity claims the referenced evidence does not
//! support. Every fatal violation is collected so the
//! rejection reason lists all of them. Rejection reasons are diagnostics and
//! never reach end users.
//!
//! Strict acceptance implies lenient acceptance: every check that is fatal in
//! lenient mode is fatal in strict mode too.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::incident::{Incident, Severity};
use crate::slots::{ActionCategory, IgnoreReason, StructuredSlots, MAX_ACTIONS, MAX_NOTE_CHARS, MAX_REASON_IDS};
use crate::telemetry;

/// How violations are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Repair where possible.
    #[default]
    Lenient,
    /// Reject on any repairable violation.
    Strict,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown validation mode '{other}'")),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repair applied in lenient mode (dedup and note cleanup apply in both).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AppliedFix {
    DroppedUnknownEvidence(String),
    DroppedDuplicateEvidence(String),
    TruncatedReasons { kept: usize },
    ClampedConfidence { from: f64, to: f64 },
    DroppedUnknownAction(String),
    DroppedDuplicateAction(ActionCategory),
    TruncatedActions { kept: usize },
    DroppedIgnoreGuidance,
    NormalizedNote,
}

/// Slots that passed validation.
///
/// Only the validator can build one, so rendering can never see unchecked
/// model output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedSlots {
    assessed_severity: Severity,
    reason_ids: Vec<String>,
    actions: Vec<ActionCategory>,
    confidence: f64,
    ignore_reason: Option<IgnoreReason>,
    note: Option<String>,
}

impl ValidatedSlots {
    pub fn assessed_severity(&self) -> Severity {
        self.assessed_severity
    }

    /// Evidence ids, all present in the incident, in model order.
    pub fn reason_ids(&self) -> &[String] {
        &self.reason_ids
    }

    pub fn actions(&self) -> &[ActionCategory] {
        &self.actions
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Set only when the model flagged the incident ignorable with a known reason.
    pub fn ignore_reason(&self) -> Option<IgnoreReason> {
        self.ignore_reason
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationResult {
    Valid(ValidatedSlots),
    Repaired(ValidatedSlots, Vec<AppliedFix>),
    Rejected(String),
}

impl ValidationResult {
    pub fn slots(&self) -> Option<&ValidatedSlots> {
        match self {
            Self::Valid(slots) | Self::Repaired(slots, _) => Some(slots),
            Self::Rejected(_) => None,
        }
    }

    pub fn into_slots(self) -> Result<ValidatedSlots, String> {
        match self {
            Self::Valid(slots) | Self::Repaired(slots, _) => Ok(slots),
            Self::Rejected(reason) => Err(reason),
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Repaired(..) => "repaired",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Collects fixes and fatal violations for one validation pass.
struct Findings {
    mode: ValidationMode,
    fixes: Vec<AppliedFix>,
    fatal: Vec<String>,
}

impl Findings {
    /// Repair in lenient mode, reject in strict mode.
    fn repairable(&mut self, fix: AppliedFix, violation: impl FnOnce() -> String) {
        match self.mode {
            ValidationMode::Lenient => self.fixes.push(fix),
            ValidationMode::Strict => self.fatal.push(violation()),
        }
    }

    fn fatal(&mut self, violation: String) {
        self.fatal.push(violation);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotValidator;

impl SlotValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        slots: &StructuredSlots,
        incident: &Incident,
        mode: ValidationMode,
    ) -> ValidationResult {
        let mut findings = Findings { mode, fixes: Vec::new(), fatal: Vec::new() };

        let reason_ids = check_evidence(slots, incident, &mut findings);
        let confidence = check_confidence(slots.confidence, &mut findings);
        let actions = check_actions(slots, incident.severity, &mut findings);
        check_severity(slots.assessed_severity, &reason_ids, incident, &mut findings);
        let ignore_reason = check_ignore(slots, incident.severity, &mut findings);
        let note = clean_note(slots.note.as_deref(), &mut findings);

        let result = if !findings.fatal.is_empty() {
            ValidationResult::Rejected(findings.fatal.join("; "))
        } else {
            let validated = ValidatedSlots {
                assessed_severity: slots.assessed_severity,
                reason_ids,
                actions,
                confidence,
                ignore_reason,
                note,
            };
            if findings.fixes.is_empty() {
                ValidationResult::Valid(validated)
            } else {
                ValidationResult::Repaired(validated, findings.fixes)
            }
        };

        tracing::debug!(
            incident_id = %incident.id,
            mode = mode.as_str(),
            outcome = result.label(),
            "slots validated"
        );
        telemetry::record_validation(result.label(), mode.as_str());
        result
    }
}

fn check_evidence(slots: &StructuredSlots, incident: &Incident, findings: &mut Findings) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(slots.reason_ids.len());
    for raw in &slots.reason_ids {
        let id = raw.trim();
        if kept.iter().any(|k| k == id) {
            findings.fixes.push(AppliedFix::DroppedDuplicateEvidence(id.to_string()));
            continue;
        }
        if !incident.has_evidence(id) {
            findings.repairable(AppliedFix::DroppedUnknownEvidence(id.to_string()), || {
                format!("evidence id '{id}' not in incident")
            });
            continue;
        }
        kept.push(id.to_string());
    }

    if kept.len() > MAX_REASON_IDS {
        let count = kept.len();
        findings.repairable(AppliedFix::TruncatedReasons { kept: MAX_REASON_IDS }, || {
            format!("{count} evidence ids exceed the cap of {MAX_REASON_IDS}")
        });
        kept.truncate(MAX_REASON_IDS);
    }
    if kept.is_empty() {
        findings.fatal("no referenced evidence exists in the incident".to_string());
    }
    kept
}

fn check_confidence(confidence: f64, findings: &mut Findings) -> f64 {
    if confidence.is_nan() {
        findings.fatal("confidence is NaN".to_string());
        return 0.0;
    }
    if (0.0..=1.0).contains(&confidence) {
        return confidence;
    }
    let clamped = confidence.clamp(0.0, 1.0);
    findings.repairable(AppliedFix::ClampedConfidence { from: confidence, to: clamped }, || {
        format!("confidence {confidence} outside [0, 1]")
    });
    clamped
}

fn check_actions(slots: &StructuredSlots, severity: Severity, findings: &mut Findings) -> Vec<ActionCategory> {
    let mut kept: Vec<ActionCategory> = Vec::with_capacity(slots.action_categories.len());
    for raw in &slots.action_categories {
        let Ok(action) = raw.parse::<ActionCategory>() else {
            findings.repairable(AppliedFix::DroppedUnknownAction(raw.clone()), || {
                format!("unknown action category '{raw}'")
            });
            continue;
        };
        if kept.contains(&action) {
            findings.fixes.push(AppliedFix::DroppedDuplicateAction(action));
            continue;
        }
        if !action.allowed_at(severity) {
            findings.fatal(format!("action {} not permitted at {severity} severity", action.as_str()));
            continue;
        }
        kept.push(action);
    }

    if kept.len() > MAX_ACTIONS {
        let count = kept.len();
        findings.repairable(AppliedFix::TruncatedActions { kept: MAX_ACTIONS }, || {
            format!("{count} actions exceed the cap of {MAX_ACTIONS}")
        });
        kept.truncate(MAX_ACTIONS);
    }
    kept
}

/// Escalation above the incident is bounded by the strongest referenced
/// evidence plus one level; de-escalation by one level below the incident.
fn check_severity(assessed: Severity, reason_ids: &[String], incident: &Incident, findings: &mut Findings) {
    let supported = reason_ids
        .iter()
        .filter_map(|id| incident.evidence_by_id(id))
        .map(|e| e.severity)
        .max()
        .unwrap_or(Severity::Low);

    if assessed > incident.severity && assessed.steps_above(supported) > 1 {
        findings.fatal(format!(
            "severity escalation to {assessed} unsupported: incident {}, strongest referenced evidence {supported}",
            incident.severity
        ));
    }
    if assessed.steps_above(incident.severity) < -1 {
        findings.fatal(format!(
            "severity de-escalation to {assessed} more than one level below incident {}",
            incident.severity
        ));
    }
}

fn check_ignore(slots: &StructuredSlots, severity: Severity, findings: &mut Findings) -> Option<IgnoreReason> {
    if slots.can_be_ignored != Some(true) {
        return None;
    }
    let reason = slots.ignore_reason.as_deref().and_then(|r| r.parse::<IgnoreReason>().ok());
    let Some(reason) = reason else {
        let raw = slots.ignore_reason.clone().unwrap_or_default();
        findings.repairable(AppliedFix::DroppedIgnoreGuidance, || {
            format!("ignore flag with unknown reason '{raw}'")
        });
        return None;
    };
    if severity >= Severity::High {
        findings.repairable(AppliedFix::DroppedIgnoreGuidance, || {
            format!("ignore flag not permitted at {severity} severity")
        });
        return None;
    }
    Some(reason)
}

fn clean_note(note: Option<&str>, findings: &mut Findings) -> Option<String> {
    let original = note?;
    let cleaned: String = original
        .nfc()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_NOTE_CHARS)
        .collect();
    if cleaned != original {
        // Cosmetic in both modes; the note is never rendered.
        findings.fixes.push(AppliedFix::NormalizedNote);
    }
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
