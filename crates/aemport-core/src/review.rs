//! Review gate: runs independent validators and reduces their findings to
//! one pass/fail decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collaborator::{CollaboratorOutput, ReviewRequest, Validator};
use crate::domain::{PortError, Result, ReviewFinding, Severity};
use crate::retry::RetryPolicy;

/// Aggregated decision over one review pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub passed: bool,
    pub checks: usize,
    pub failing_checks: Vec<String>,
    pub worst_severity: Severity,
    pub summary: String,
}

/// Pure reduction of findings at `threshold`.
///
/// Passes only when every finding has `passed = true` and a severity
/// strictly below `threshold`. No findings at all is not a pass.
pub fn aggregate_findings(findings: &[ReviewFinding], threshold: Severity) -> ReviewVerdict {
    let failing: Vec<&ReviewFinding> = findings.iter().filter(|f| !f.clears(threshold)).collect();
    let worst_severity = findings
        .iter()
        .map(|f| f.severity)
        .max()
        .unwrap_or(Severity::None);
    let passed = !findings.is_empty() && failing.is_empty();

    let summary = if findings.is_empty() {
        "no review findings; treating as failed".to_string()
    } else if passed {
        format!("{}/{} checks passed", findings.len(), findings.len())
    } else {
        let listed: Vec<String> = failing
            .iter()
            .map(|f| format!("{} ({})", f.check_name, f.severity))
            .collect();
        format!(
            "{}/{} checks passed; failing: {}",
            findings.len() - failing.len(),
            findings.len(),
            listed.join(", ")
        )
    };

    ReviewVerdict {
        passed,
        checks: findings.len(),
        failing_checks: failing.iter().map(|f| f.check_name.clone()).collect(),
        worst_severity,
        summary,
    }
}

/// Runs a fixed set of validators and gates on their findings.
pub struct ReviewAggregator {
    validators: Vec<Arc<dyn Validator>>,
    threshold: Severity,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ReviewAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewAggregator")
            .field("checks", &self.check_names())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl ReviewAggregator {
    /// Check names must be unique so every finding maps to one check.
    pub fn new(
        validators: Vec<Arc<dyn Validator>>,
        threshold: Severity,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for validator in &validators {
            if !seen.insert(validator.name().to_string()) {
                return Err(PortError::DuplicateCheck(validator.name().to_string()));
            }
        }
        Ok(Self {
            validators,
            threshold,
            retry,
        })
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    pub fn check_names(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.name().to_string()).collect()
    }

    /// Reduce `findings`. A configured check without a finding counts as a
    /// failing `high` finding.
    pub fn aggregate(&self, findings: &[ReviewFinding]) -> ReviewVerdict {
        let mut all = findings.to_vec();
        for name in self.check_names() {
            if !findings.iter().any(|f| f.check_name == name) {
                all.push(ReviewFinding::missing(name, "check produced no finding"));
            }
        }
        aggregate_findings(&all, self.threshold)
    }

    /// Run every validator in order, each under the retry policy. Exactly
    /// one finding per check is returned.
    pub async fn run_checks(&self, request: &ReviewRequest) -> Vec<ReviewFinding> {
        let mut findings = Vec::with_capacity(self.validators.len());
        for validator in &self.validators {
            let name = validator.name().to_string();
            let output = self
                .retry
                .run_output(&name, move |_| validator.review(request))
                .await;
            let finding = match output {
                CollaboratorOutput::Structured(mut finding) => {
                    finding.check_name = name;
                    finding
                }
                CollaboratorOutput::Raw(text) => {
                    warn!(check = %name, "validator returned an unstructured verdict");
                    let mut finding = ReviewFinding::missing(name, "unstructured verdict");
                    finding.details = Some(text);
                    finding
                }
                CollaboratorOutput::Failed(e) => {
                    warn!(check = %name, error = %e, "validator failed");
                    ReviewFinding::missing(name, e.to_string())
                }
            };
            findings.push(finding);
        }
        findings
    }
}
