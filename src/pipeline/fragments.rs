//! Pre-authored text fragments.
//!
//! Every sentence a user sees comes from these tables, keyed by incident
//! category, evidence kind, action category, severity and ignore reason. The
//! model selects keys; it never supplies wording.

use crate::incident::{EvidenceKind, Incident, IncidentCategory, Severity};
use crate::slots::{ActionCategory, IgnoreReason};

/// Longest subject label carried into a summary.
const MAX_SUBJECT_CHARS: usize = 48;

pub fn severity_lead(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "Low risk",
        Severity::Medium => "Moderate risk",
        Severity::High => "High risk",
        Severity::Critical => "Critical risk",
    }
}

pub fn category_phrase(category: IncidentCategory) -> &'static str {
    match category {
        IncidentCategory::SuspiciousApp => "an app on this device shows suspicious behavior",
        IncidentCategory::NetworkThreat => "a network connection looks unsafe",
        IncidentCategory::DeviceIntegrity => "the device's integrity may be compromised",
        IncidentCategory::AccountSecurity => "one of your accounts may be at risk",
        IncidentCategory::PrivacyExposure => "personal data may be exposed",
    }
}

pub fn evidence_text(kind: EvidenceKind) -> &'static str {
    match kind {
        EvidenceKind::DangerousPermission => "It holds permissions that give access to sensitive data.",
        EvidenceKind::AccessibilityService => "It uses an accessibility service that can read and control the screen.",
        EvidenceKind::DeviceAdmin => "It has device administrator rights, which make it hard to remove.",
        EvidenceKind::OverlayWindow => "It can draw over other apps, which is used to hide or fake content.",
        EvidenceKind::UnknownInstallSource => "It was installed from outside a trusted app store.",
        EvidenceKind::SuspiciousNetwork => "It contacted a network destination associated with abuse.",
        EvidenceKind::CertificateChange => "A security certificate on the connection changed unexpectedly.",
        EvidenceKind::RootIndicator => "Signs of a rooted or modified system were found.",
        EvidenceKind::OutdatedSystem => "The system is missing recent security updates.",
        EvidenceKind::BackgroundActivity => "It is unusually active in the background.",
    }
}

pub fn action_text(action: ActionCategory) -> &'static str {
    match action {
        ActionCategory::ReviewPermissions => "Review the app's permissions and remove any it does not need.",
        ActionCategory::RestrictBackground => "Restrict the app's background activity.",
        ActionCategory::UpdateApp => "Update the app to its latest version.",
        ActionCategory::UpdateSystem => "Install the latest system update.",
        ActionCategory::ChangePassword => "Change the password of the affected account.",
        ActionCategory::EnableTwoFactor => "Turn on two-step verification for the account.",
        ActionCategory::MonitorActivity => "Keep an eye on this for the next few days.",
        ActionCategory::UninstallApp => "Uninstall the app if you do not recognize or need it.",
        ActionCategory::RevokeDeviceAdmin => "Remove the app's device administrator rights.",
        ActionCategory::ContactSupport => "Contact your provider's support if you notice anything unusual.",
        ActionCategory::DisconnectNetwork => "Disconnect from this network now.",
        ActionCategory::FactoryReset => "Back up your data and reset the device to factory settings.",
    }
}

pub fn ignore_text(reason: IgnoreReason) -> &'static str {
    match reason {
        IgnoreReason::KnownTrustedApp => "If you installed this app yourself and trust it, you can ignore this alert.",
        IgnoreReason::ExpectedBehavior => "This is often expected behavior; you can ignore it if nothing else seems wrong.",
        IgnoreReason::UserInitiated => "If you made this change yourself, you can ignore this alert.",
        IgnoreReason::SystemComponent => "This belongs to the system; you can usually ignore it.",
    }
}

/// Action a deterministic explanation suggests for one kind of evidence.
pub fn suggested_action(kind: EvidenceKind) -> ActionCategory {
    match kind {
        EvidenceKind::DangerousPermission => ActionCategory::ReviewPermissions,
        EvidenceKind::AccessibilityService => ActionCategory::ReviewPermissions,
        EvidenceKind::DeviceAdmin => ActionCategory::RevokeDeviceAdmin,
        EvidenceKind::OverlayWindow => ActionCategory::ReviewPermissions,
        EvidenceKind::UnknownInstallSource => ActionCategory::UninstallApp,
        EvidenceKind::SuspiciousNetwork => ActionCategory::DisconnectNetwork,
        EvidenceKind::CertificateChange => ActionCategory::DisconnectNetwork,
        EvidenceKind::RootIndicator => ActionCategory::ContactSupport,
        EvidenceKind::OutdatedSystem => ActionCategory::UpdateSystem,
        EvidenceKind::BackgroundActivity => ActionCategory::RestrictBackground,
    }
}

/// Baseline actions per category, strongest last.
pub fn category_actions(category: IncidentCategory) -> &'static [ActionCategory] {
    match category {
        IncidentCategory::SuspiciousApp => &[ActionCategory::ReviewPermissions, ActionCategory::UninstallApp],
        IncidentCategory::NetworkThreat => &[ActionCategory::MonitorActivity, ActionCategory::DisconnectNetwork],
        IncidentCategory::DeviceIntegrity => &[ActionCategory::UpdateSystem, ActionCategory::FactoryReset],
        IncidentCategory::AccountSecurity => &[ActionCategory::ChangePassword, ActionCategory::EnableTwoFactor],
        IncidentCategory::PrivacyExposure => &[ActionCategory::ReviewPermissions, ActionCategory::MonitorActivity],
    }
}

/// Summary sentence: severity lead, category phrase, optional subject.
pub fn summary(incident: &Incident, severity: Severity) -> String {
    let lead = severity_lead(severity);
    let phrase = category_phrase(incident.category);
    match incident.subject.as_deref().map(display_label).filter(|s| !s.is_empty()) {
        Some(subject) => format!("{lead}: {phrase} ({subject})."),
        None => format!("{lead}: {phrase}."),
    }
}

/// Collector labels are untrusted: drop control characters and bound length.
pub fn display_label(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.chars().count() <= MAX_SUBJECT_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(MAX_SUBJECT_CHARS - 1).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_cleaned_and_bounded() {
        assert_eq!(display_label("  Flash\u{0}light  "), "Flashlight");
        let long = "x".repeat(100);
        assert_eq!(display_label(&long).chars().count(), MAX_SUBJECT_CHARS);
    }

    #[test]
    fn every_action_has_text() {
        for action in ActionCategory::ALL {
            assert!(!action_text(action).is_empty());
        }
    }
}
