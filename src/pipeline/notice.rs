//! Localized notices shown next to a fallback answer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::answer::FallbackCause;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    De,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept region tags like de-AT or en_US.
        let lang = s.trim().split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
        match lang.as_str() {
            "en" => Ok(Self::En),
            "de" => Ok(Self::De),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

/// Notice for a fallback answer. Diagnostic detail never appears here.
pub fn fallback_notice(cause: &FallbackCause, locale: Locale) -> &'static str {
    match (locale, cause) {
        (Locale::En, FallbackCause::Busy) => {
            "The on-device assistant was busy, so this explanation uses standard rules."
        }
        (Locale::En, FallbackCause::Timeout) => {
            "The on-device assistant took too long, so this explanation uses standard rules."
        }
        (Locale::En, FallbackCause::Unavailable) => {
            "The on-device assistant is not available, so this explanation uses standard rules."
        }
        (Locale::En, _) => {
            "The on-device assistant could not produce a reliable explanation, so this one uses standard rules."
        }
        (Locale::De, FallbackCause::Busy) => {
            "Der Assistent auf dem Gerät war ausgelastet, daher beruht diese Erklärung auf Standardregeln."
        }
        (Locale::De, FallbackCause::Timeout) => {
            "Der Assistent auf dem Gerät hat zu lange gebraucht, daher beruht diese Erklärung auf Standardregeln."
        }
        (Locale::De, FallbackCause::Unavailable) => {
            "Der Assistent auf dem Gerät ist nicht verfügbar, daher beruht diese Erklärung auf Standardregeln."
        }
        (Locale::De, _) => {
            "Der Assistent auf dem Gerät konnte keine verlässliche Erklärung liefern, daher beruht diese auf Standardregeln."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_parses_region_tags() {
        assert_eq!("de-AT".parse::<Locale>(), Ok(Locale::De));
        assert_eq!("EN_us".parse::<Locale>(), Ok(Locale::En));
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn busy_notice_differs_from_error_notice() {
        let busy = fallback_notice(&FallbackCause::Busy, Locale::En);
        let parse = fallback_notice(&FallbackCause::ParseFailure, Locale::En);
        assert_ne!(busy, parse);
        assert!(!parse.contains("parse"));
    }
}
