//! Security: rule-based threat classification for goals, tool inputs,
//! and shell commands.
//!
//! A [`ThreatScanner`] evaluates text against an extendable catalog of
//! [`ThreatPattern`]s and produces a [`ScanResult`] ordered by severity.
//! Blocking decisions are severity-only: High/Critical block, Low/Medium
//! are recorded. Categories are informational.
//!
//! # Modules
//!
//! - [`pattern`] — `RiskLevel`, `ThreatCategory`, `ThreatPattern`, `ThreatMatch`
//! - [`catalog`] — `default_catalog()` built-in rules
//! - [`scanner`] — `ThreatScanner`, `ScanResult`

pub mod catalog;
pub mod pattern;
pub mod scanner;

pub use catalog::default_catalog;
pub use pattern::{RiskLevel, ThreatCategory, ThreatMatch, ThreatPattern};
pub use scanner::{ScanResult, ThreatScanner};
