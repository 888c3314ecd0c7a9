//! Rule-based threat scanner over the pattern catalog.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::default_catalog;
use super::pattern::{RiskLevel, ThreatMatch, ThreatPattern};

/// Risk assessment produced by one [`ThreatScanner::scan`] call.
///
/// `safe` holds exactly when `threats` is empty. `risk` is the maximum
/// severity across all matches, not merely the first. Threats are ordered
/// severity-descending, then by start offset ascending, so callers acting
/// on the first entry see the most severe, leftmost match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub safe: bool,
    pub risk: Option<RiskLevel>,
    pub threats: Vec<ThreatMatch>,
    pub summary: String,
}

impl ScanResult {
    fn clean(summary: impl Into<String>) -> Self {
        Self {
            safe: true,
            risk: None,
            threats: Vec::new(),
            summary: summary.into(),
        }
    }

    /// Whether any match is at a blocking severity (High or Critical).
    pub fn has_blocking_threat(&self) -> bool {
        self.threats.iter().any(|t| t.risk.is_blocking())
    }
}

/// Stateless-per-call classifier over an extendable pattern catalog.
///
/// Construct one per process and share via `Arc`; `scan` never fails and
/// never mutates its input. The scanner can be disabled globally, which
/// makes every input safe without touching the catalog.
pub struct ThreatScanner {
    patterns: RwLock<Vec<ThreatPattern>>,
    enabled: AtomicBool,
}

impl ThreatScanner {
    /// Scanner with the built-in catalog.
    pub fn new() -> Self {
        Self::with_patterns(default_catalog())
    }

    /// Scanner with a caller-supplied catalog.
    pub fn with_patterns(patterns: Vec<ThreatPattern>) -> Self {
        Self {
            patterns: RwLock::new(patterns),
            enabled: AtomicBool::new(true),
        }
    }

    /// Append a pattern at runtime.
    pub fn register_pattern(&self, pattern: ThreatPattern) {
        if let Ok(mut guard) = self.patterns.write() {
            guard.push(pattern);
        }
    }

    /// Enable or disable scanning. Disabled scans report safe immediately.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Scan `text` against every pattern in the catalog.
    ///
    /// Each pattern is evaluated globally (all matches, not first-match-only).
    pub fn scan(&self, text: &str) -> ScanResult {
        if !self.is_enabled() {
            return ScanResult::clean("scanner disabled");
        }
        if text.is_empty() {
            return ScanResult::clean("no threats detected");
        }

        let guard = match self.patterns.read() {
            Ok(g) => g,
            // A poisoned lock means a panic mid-registration; fail open on
            // the catalog we can no longer read rather than panicking.
            Err(_) => return ScanResult::clean("pattern catalog unavailable"),
        };

        let mut threats: Vec<ThreatMatch> = Vec::new();
        for pattern in guard.iter() {
            for m in pattern.matcher.find_iter(text) {
                threats.push(ThreatMatch {
                    pattern_name: pattern.name.clone(),
                    risk: pattern.risk,
                    category: pattern.category.clone(),
                    description: pattern.description.clone(),
                    matched_text: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        drop(guard);

        if threats.is_empty() {
            return ScanResult::clean("no threats detected");
        }

        threats.sort_by_key(|t| (Reverse(t.risk), t.start));
        let risk = threats.iter().map(|t| t.risk).max();

        let listed: Vec<String> = threats
            .iter()
            .take(5)
            .map(|t| format!("{} ({}/{})", t.pattern_name, t.risk, t.category))
            .collect();
        let summary = format!(
            "{} potential threat(s) detected: {}",
            threats.len(),
            listed.join(", ")
        );
        debug!(
            event = "security.scan",
            threats = threats.len(),
            risk = %risk.map(|r| r.to_string()).unwrap_or_default(),
            "threat scan flagged input"
        );

        ScanResult {
            safe: false,
            risk,
            threats,
            summary,
        }
    }

    /// Convenience predicate: does `text` contain any High/Critical match?
    pub fn has_blocking_threat(&self, text: &str) -> bool {
        self.scan(text).has_blocking_threat()
    }
}

impl Default for ThreatScanner {
    fn default() -> Self {
        Self::new()
    }
}
