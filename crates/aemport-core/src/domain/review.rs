//! Review findings produced by independent validators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered finding severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Lenient parse of reviewer-provided text. Unknown labels map to `High`
    /// so an unreadable verdict never gates as a pass.
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "none" | "info" | "" => Severity::None,
            "low" | "minor" => Severity::Low,
            "medium" | "moderate" | "warning" => Severity::Medium,
            "high" | "major" | "error" => Severity::High,
            "critical" | "blocker" => Severity::Critical,
            _ => Severity::High,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Verdict of one review check. `passed` and `severity` are independent signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub check_name: String,
    pub passed: bool,
    pub severity: Severity,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl ReviewFinding {
    pub fn pass(check_name: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            passed: true,
            severity: Severity::None,
            issues: Vec::new(),
            recommendations: Vec::new(),
            details: None,
        }
    }

    pub fn fail(
        check_name: impl Into<String>,
        severity: Severity,
        issue: impl Into<String>,
    ) -> Self {
        Self {
            check_name: check_name.into(),
            passed: false,
            severity,
            issues: vec![issue.into()],
            recommendations: Vec::new(),
            details: None,
        }
    }

    /// Stand-in for a validator that produced no usable verdict.
    pub fn missing(check_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            check_name: check_name.into(),
            passed: false,
            severity: Severity::High,
            issues: vec![format!("no verdict: {reason}")],
            recommendations: vec!["re-run the check once the validator is available".to_string()],
            details: Some(reason),
        }
    }

    pub fn with_recommendation(mut self, text: impl Into<String>) -> Self {
        self.recommendations.push(text.into());
        self
    }

    /// Whether this finding alone clears the gate at `threshold`.
    pub fn clears(&self, threshold: Severity) -> bool {
        self.passed && self.severity < threshold
    }
}
