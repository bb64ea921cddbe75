//! Structured slot schema the model fills instead of writing prose.
//!
//! The model only selects and ranks: evidence ids it considers relevant,
//! action categories from a closed set, a severity and a confidence. All
//! user-visible wording comes from pre-authored fragments at render time.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::incident::Severity;

/// Maximum evidence ids a slot set may reference.
pub const MAX_REASON_IDS: usize = 5;
/// Maximum recommended action categories.
pub const MAX_ACTIONS: usize = 4;
/// Maximum characters kept from the optional note.
pub const MAX_NOTE_CHARS: usize = 160;

/// Closed set of recommendations the model may select from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCategory {
    ReviewPermissions,
    RestrictBackground,
    UpdateApp,
    UpdateSystem,
    ChangePassword,
    EnableTwoFactor,
    MonitorActivity,
    UninstallApp,
    RevokeDeviceAdmin,
    ContactSupport,
    DisconnectNetwork,
    FactoryReset,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 12] = [
        Self::ReviewPermissions,
        Self::RestrictBackground,
        Self::UpdateApp,
        Self::UpdateSystem,
        Self::ChangePassword,
        Self::EnableTwoFactor,
        Self::MonitorActivity,
        Self::UninstallApp,
        Self::RevokeDeviceAdmin,
        Self::ContactSupport,
        Self::DisconnectNetwork,
        Self::FactoryReset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReviewPermissions => "REVIEW_PERMISSIONS",
            Self::RestrictBackground => "RESTRICT_BACKGROUND",
            Self::UpdateApp => "UPDATE_APP",
            Self::UpdateSystem => "UPDATE_SYSTEM",
            Self::ChangePassword => "CHANGE_PASSWORD",
            Self::EnableTwoFactor => "ENABLE_TWO_FACTOR",
            Self::MonitorActivity => "MONITOR_ACTIVITY",
            Self::UninstallApp => "UNINSTALL_APP",
            Self::RevokeDeviceAdmin => "REVOKE_DEVICE_ADMIN",
            Self::ContactSupport => "CONTACT_SUPPORT",
            Self::DisconnectNetwork => "DISCONNECT_NETWORK",
            Self::FactoryReset => "FACTORY_RESET",
        }
    }

    /// Lowest severity at which this recommendation is proportionate.
    pub fn min_severity(self) -> Severity {
        match self {
            Self::FactoryReset => Severity::Critical,
            Self::DisconnectNetwork => Severity::High,
            Self::UninstallApp | Self::RevokeDeviceAdmin | Self::ContactSupport => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn allowed_at(self, severity: Severity) -> bool {
        severity >= self.min_severity()
    }
}

impl FromStr for ActionCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(key))
            .ok_or(())
    }
}

/// Closed set of reasons an incident may be safe to ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IgnoreReason {
    KnownTrustedApp,
    ExpectedBehavior,
    UserInitiated,
    SystemComponent,
}

impl IgnoreReason {
    pub const ALL: [IgnoreReason; 4] = [
        Self::KnownTrustedApp,
        Self::ExpectedBehavior,
        Self::UserInitiated,
        Self::SystemComponent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnownTrustedApp => "KNOWN_TRUSTED_APP",
            Self::ExpectedBehavior => "EXPECTED_BEHAVIOR",
            Self::UserInitiated => "USER_INITIATED",
            Self::SystemComponent => "SYSTEM_COMPONENT",
        }
    }
}

impl FromStr for IgnoreReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(key))
            .ok_or(())
    }
}

/// Slots exactly as decoded from the model payload.
///
/// Action categories and the ignore reason stay as raw keys here: an unknown
/// key is a validation concern, not a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredSlots {
    pub assessed_severity: Severity,
    pub reason_ids: Vec<String>,
    pub action_categories: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub can_be_ignored: Option<bool>,
    #[serde(default)]
    pub ignore_reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Top-level keys a payload must carry to be schema compliant.
pub const REQUIRED_FIELDS: [&str; 4] = [
    "assessed_severity",
    "reason_ids",
    "action_categories",
    "confidence",
];
