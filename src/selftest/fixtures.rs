//! Built-in incidents with recorded model output.
//!
//! The set covers a clean answer, fenced output, an ignorable incident, an
//! unsupported escalation, prose instead of JSON, a hallucinated evidence id
//! and a native decode failure.

use crate::engine::{NativeErrorCode, ReplayBackend, ReplayStep};
use crate::incident::{Evidence, EvidenceKind, Incident, IncidentCategory, Severity};

#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: &'static str,
    pub incident: Incident,
    /// What the recorded model produced for this incident.
    pub step: ReplayStep,
}

impl Fixture {
    /// Replay key: the incident header line as it appears in the prompt.
    pub fn replay_key(&self) -> String {
        format!("Incident {}\n", self.incident.id)
    }
}

fn evidence(id: &str, kind: EvidenceKind, severity: Severity, label: Option<&str>) -> Evidence {
    Evidence { id: id.to_string(), kind, severity, label: label.map(str::to_string) }
}

fn respond(text: &str) -> ReplayStep {
    ReplayStep::Respond(text.to_string())
}

pub fn builtin() -> Vec<Fixture> {
    vec![
        Fixture {
            name: "overlay_app_high",
            incident: Incident {
                id: "st-overlay".into(),
                category: IncidentCategory::SuspiciousApp,
                severity: Severity::High,
                subject: Some("Flashlight Pro".into()),
                evidence: vec![
                    evidence("ev-1", EvidenceKind::OverlayWindow, Severity::High, Some("Draws over other apps")),
                    evidence("ev-2", EvidenceKind::AccessibilityService, Severity::Medium, None),
                    evidence("ev-3", EvidenceKind::UnknownInstallSource, Severity::Low, None),
                ],
            },
            step: respond(
                r#"{"assessed_severity":"HIGH","reason_ids":["ev-1","ev-2"],"action_categories":["REVIEW_PERMISSIONS","UNINSTALL_APP"],"confidence":0.86}"#,
            ),
        },
        Fixture {
            name: "root_critical_fenced",
            incident: Incident {
                id: "st-root".into(),
                category: IncidentCategory::DeviceIntegrity,
                severity: Severity::Critical,
                subject: None,
                evidence: vec![
                    evidence("ev-1", EvidenceKind::RootIndicator, Severity::Critical, Some("su binary present")),
                    evidence("ev-2", EvidenceKind::CertificateChange, Severity::High, None),
                ],
            },
            step: respond(
                "```json\n{\"assessed_severity\":\"CRITICAL\",\"reason_ids\":[\"ev-1\",\"ev-2\"],\"action_categories\":[\"CONTACT_SUPPORT\",\"FACTORY_RESET\"],\"confidence\":0.91}\n```",
            ),
        },
        Fixture {
            name: "background_low_ignorable",
            incident: Incident {
                id: "st-background".into(),
                category: IncidentCategory::PrivacyExposure,
                severity: Severity::Low,
                subject: Some("Podcast Player".into()),
                evidence: vec![evidence("ev-1", EvidenceKind::BackgroundActivity, Severity::Low, None)],
            },
            step: respond(
                r#"{"assessed_severity":"LOW","reason_ids":["ev-1"],"action_categories":["RESTRICT_BACKGROUND"],"confidence":0.7,"can_be_ignored":true,"ignore_reason":"EXPECTED_BEHAVIOR"}"#,
            ),
        },
        Fixture {
            name: "unsupported_escalation",
            incident: Incident {
                id: "st-escalation".into(),
                category: IncidentCategory::SuspiciousApp,
                severity: Severity::High,
                subject: Some("QuickCleaner".into()),
                evidence: vec![evidence("ev-1", EvidenceKind::DangerousPermission, Severity::Medium, None)],
            },
            step: respond(
                r#"{"assessed_severity":"CRITICAL","reason_ids":["ev-1"],"action_categories":["FACTORY_RESET"],"confidence":0.97}"#,
            ),
        },
        Fixture {
            name: "prose_instead_of_json",
            incident: Incident {
                id: "st-prose".into(),
                category: IncidentCategory::NetworkThreat,
                severity: Severity::Medium,
                subject: Some("Airport_Free_WiFi".into()),
                evidence: vec![evidence("ev-1", EvidenceKind::SuspiciousNetwork, Severity::Medium, None)],
            },
            step: respond("This network looks risky. You should disconnect from it right away."),
        },
        Fixture {
            name: "hallucinated_evidence",
            incident: Incident {
                id: "st-account".into(),
                category: IncidentCategory::AccountSecurity,
                severity: Severity::Medium,
                subject: None,
                evidence: vec![evidence("ev-1", EvidenceKind::DeviceAdmin, Severity::Medium, None)],
            },
            step: respond(
                r#"{"assessed_severity":"MEDIUM","reason_ids":["ev-1","ev-7"],"action_categories":["REVOKE_DEVICE_ADMIN","CHANGE_PASSWORD"],"confidence":0.64}"#,
            ),
        },
        Fixture {
            name: "native_decode_error",
            incident: Incident {
                id: "st-outdated".into(),
                category: IncidentCategory::DeviceIntegrity,
                severity: Severity::Low,
                subject: None,
                evidence: vec![evidence("ev-1", EvidenceKind::OutdatedSystem, Severity::Low, None)],
            },
            step: ReplayStep::Fail(NativeErrorCode::Decode, "llama_decode returned 1".into()),
        },
    ]
}

/// Replay backend answering each fixture's prompt with its recorded step.
pub fn replay_backend(fixtures: &[Fixture]) -> ReplayBackend {
    ReplayBackend::keyed(fixtures.iter().map(|f| (f.replay_key(), f.step.clone())).collect())
}
