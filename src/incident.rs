//! Incident data model consumed by the explanation pipeline.
//!
//! Incidents are produced upstream by the signal collectors; this crate only
//! reads them. Every incident carries its own evidence list, and every piece
//! of evidence its own severity, so the validator can judge what a model
//! claim is actually backed by.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered severity scale. Comparisons follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[serde(alias = "low", alias = "Low")]
    Low,
    #[serde(alias = "medium", alias = "Medium")]
    Medium,
    #[serde(alias = "high", alias = "High")]
    High,
    #[serde(alias = "critical", alias = "Critical")]
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Numeric level, 0 (LOW) through 3 (CRITICAL).
    pub fn level(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Signed distance from `base` to `self` in levels.
    pub fn steps_above(self, base: Severity) -> i8 {
        self.level() as i8 - base.level() as i8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad incident family, used to pick summary fragments and default actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentCategory {
    SuspiciousApp,
    NetworkThreat,
    DeviceIntegrity,
    AccountSecurity,
    PrivacyExposure,
}

impl IncidentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuspiciousApp => "SUSPICIOUS_APP",
            Self::NetworkThreat => "NETWORK_THREAT",
            Self::DeviceIntegrity => "DEVICE_INTEGRITY",
            Self::AccountSecurity => "ACCOUNT_SECURITY",
            Self::PrivacyExposure => "PRIVACY_EXPOSURE",
        }
    }
}

/// Kind of signal an evidence item was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    DangerousPermission,
    AccessibilityService,
    DeviceAdmin,
    OverlayWindow,
    UnknownInstallSource,
    SuspiciousNetwork,
    CertificateChange,
    RootIndicator,
    OutdatedSystem,
    BackgroundActivity,
}

impl EvidenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DangerousPermission => "DANGEROUS_PERMISSION",
            Self::AccessibilityService => "ACCESSIBILITY_SERVICE",
            Self::DeviceAdmin => "DEVICE_ADMIN",
            Self::OverlayWindow => "OVERLAY_WINDOW",
            Self::UnknownInstallSource => "UNKNOWN_INSTALL_SOURCE",
            Self::SuspiciousNetwork => "SUSPICIOUS_NETWORK",
            Self::CertificateChange => "CERTIFICATE_CHANGE",
            Self::RootIndicator => "ROOT_INDICATOR",
            Self::OutdatedSystem => "OUTDATED_SYSTEM",
            Self::BackgroundActivity => "BACKGROUND_ACTIVITY",
        }
    }
}

/// A single observed signal backing an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub kind: EvidenceKind,
    pub severity: Severity,
    /// Display label from the collector (app name, network name). Untrusted.
    #[serde(default)]
    pub label: Option<String>,
}

/// A structured security incident awaiting explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub category: IncidentCategory,
    pub severity: Severity,
    /// Subject of the incident (usually an app label). Untrusted.
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl Incident {
    pub fn evidence_by_id(&self, id: &str) -> Option<&Evidence> {
        self.evidence.iter().find(|e| e.id == id)
    }

    pub fn has_evidence(&self, id: &str) -> bool {
        self.evidence_by_id(id).is_some()
    }

    /// Evidence sorted by severity, strongest first. Stable for equal severity.
    pub fn evidence_by_strength(&self) -> Vec<&Evidence> {
        let mut sorted: Vec<&Evidence> = self.evidence.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_and_steps() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(Severity::Critical.steps_above(Severity::Low), 3);
        assert_eq!(Severity::Low.steps_above(Severity::High), -2);
    }

    #[test]
    fn severity_accepts_lowercase_alias() {
        let s: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(s, Severity::High);
        let s: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(s, Severity::Critical);
    }

    #[test]
    fn evidence_by_strength_orders_descending() {
        let incident = Incident {
            id: "inc".into(),
            category: IncidentCategory::SuspiciousApp,
            severity: Severity::High,
            subject: None,
            evidence: vec![
                Evidence { id: "a".into(), kind: EvidenceKind::OverlayWindow, severity: Severity::Low, label: None },
                Evidence { id: "b".into(), kind: EvidenceKind::DeviceAdmin, severity: Severity::High, label: None },
            ],
        };
        let ids: Vec<&str> = incident.evidence_by_strength().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
