//! Threat pattern types — the classification axis for the scanner.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of a threat match.
///
/// Ordered: `Low < Medium < High < Critical`. High and Critical block
/// execution; Low and Medium are logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Whether a match at this level blocks execution.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// What kind of threat a pattern detects.
///
/// Categories are informational tags used in summaries; blocking decisions
/// are made on [`RiskLevel`] alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Filesystem,
    RemoteExecution,
    Exfiltration,
    Persistence,
    ReverseShell,
    PrivilegeEscalation,
    CommandInjection,
    PromptInjection,
    Custom(String),
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::RemoteExecution => write!(f, "remote_execution"),
            Self::Exfiltration => write!(f, "exfiltration"),
            Self::Persistence => write!(f, "persistence"),
            Self::ReverseShell => write!(f, "reverse_shell"),
            Self::PrivilegeEscalation => write!(f, "privilege_escalation"),
            Self::CommandInjection => write!(f, "command_injection"),
            Self::PromptInjection => write!(f, "prompt_injection"),
            Self::Custom(s) => write!(f, "custom({s})"),
        }
    }
}

/// A named detection rule: compiled matcher + severity + category.
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    pub name: String,
    pub matcher: Regex,
    pub description: String,
    pub risk: RiskLevel,
    pub category: ThreatCategory,
}

impl ThreatPattern {
    /// Compile a pattern. Returns `None` when the regex is invalid, so a bad
    /// runtime-registered pattern can never poison the catalog.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        description: impl Into<String>,
        risk: RiskLevel,
        category: ThreatCategory,
    ) -> Option<Self> {
        let matcher = Regex::new(pattern).ok()?;
        Some(Self {
            name: name.into(),
            matcher,
            description: description.into(),
            risk,
            category,
        })
    }
}

/// One match instance of one pattern against one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatMatch {
    pub pattern_name: String,
    pub risk: RiskLevel,
    pub category: ThreatCategory,
    pub description: String,
    pub matched_text: String,
    pub start: usize,
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_is_blocking() {
        assert!(!RiskLevel::Low.is_blocking());
        assert!(!RiskLevel::Medium.is_blocking());
        assert!(RiskLevel::High.is_blocking());
        assert!(RiskLevel::Critical.is_blocking());
    }

    #[test]
    fn test_risk_level_serde_roundtrip() {
        for level in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            let back: RiskLevel = serde_json::from_str(&json).unwrap();
            assert_eq!(level, back);
        }
    }

    #[test]
    fn test_pattern_new_rejects_invalid_regex() {
        assert!(ThreatPattern::new(
            "broken",
            r"[unclosed",
            "invalid",
            RiskLevel::Low,
            ThreatCategory::Custom("x".into()),
        )
        .is_none());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ThreatCategory::ReverseShell.to_string(), "reverse_shell");
        assert_eq!(
            ThreatCategory::Custom("lateral".into()).to_string(),
            "custom(lateral)"
        );
    }
}
