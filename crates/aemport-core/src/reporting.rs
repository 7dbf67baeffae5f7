//! Run reports and their digest-verified on-disk artifacts.
//!
//! Layout: `<output>/.aemport/runs/<run_id>/report.json` plus a sibling
//! `report.digest` holding the SHA-256 of the JSON bytes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{PortError, Result, ReviewFinding};
use crate::pipeline::StageTransition;

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

/// Outcome of one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub component_id: String,
    pub display_name: String,
    pub review_passed: bool,
    /// Repair cycles performed.
    pub iterations: u32,
    pub max_iterations: u32,
    pub artifact_path: PathBuf,
    pub style_path: Option<PathBuf>,
    pub review_summary: String,
    pub findings: Vec<ReviewFinding>,
    pub dependencies: Vec<String>,
    pub reused_artifacts: Vec<String>,
    pub unresolved_dependencies: Vec<String>,
    pub truncated_dependencies: Vec<String>,
    pub cyclic_references: Vec<String>,
    pub missing_classes: Vec<String>,
    pub analysis_failures: Vec<String>,
    pub stages: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineReport {
    /// One-line pass/fail summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{} {} after {} of {} repair iteration(s): {}",
            self.component_id,
            if self.review_passed { "PASSED" } else { "FAILED" },
            self.iterations,
            self.max_iterations,
            self.review_summary
        )
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!("# Conversion report: {}\n\n", self.display_name);
        md.push_str(&format!("- run: `{}`\n", self.run_id));
        md.push_str(&format!("- component: `{}`\n", self.component_id));
        md.push_str(&format!(
            "- result: **{}**\n",
            if self.review_passed { "passed" } else { "failed" }
        ));
        md.push_str(&format!(
            "- repair iterations: {}/{}\n",
            self.iterations, self.max_iterations
        ));
        md.push_str(&format!("- artifact: `{}`\n", self.artifact_path.display()));
        if let Some(style) = &self.style_path {
            md.push_str(&format!("- styles: `{}`\n", style.display()));
        }
        md.push_str(&format!("- duration: {} ms\n", self.duration_ms));

        md.push_str("\n## Review\n\n");
        md.push_str(&format!("{}\n\n", self.review_summary));
        md.push_str("| check | passed | severity | issues |\n|---|---|---|---|\n");
        for f in &self.findings {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                f.check_name,
                if f.passed { "yes" } else { "no" },
                f.severity,
                f.issues.join("; ").replace('|', "\\|")
            ));
        }

        let lists: [(&str, &Vec<String>); 6] = [
            ("Dependencies", &self.dependencies),
            ("Reused artifacts", &self.reused_artifacts),
            ("Unresolved dependencies", &self.unresolved_dependencies),
            ("Truncated at depth limit", &self.truncated_dependencies),
            ("Skipped cyclic references", &self.cyclic_references),
            ("Missing style classes", &self.missing_classes),
        ];
        for (title, items) in lists {
            if items.is_empty() {
                continue;
            }
            md.push_str(&format!("\n## {title}\n\n"));
            for item in items {
                md.push_str(&format!("- `{item}`\n"));
            }
        }
        md
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Directory holding the artifacts of `run_id`.
pub fn run_dir(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(".aemport").join("runs").join(run_id)
}

/// Persist a report and its digest; returns the report path.
pub fn write_report(output_dir: &Path, report: &PipelineReport) -> Result<PathBuf> {
    let dir = run_dir(output_dir, &report.run_id);
    std::fs::create_dir_all(&dir)?;

    let report_path = dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&report_path, &json)?;
    std::fs::write(dir.join(DIGEST_FILE), sha256_hex(&json).as_bytes())?;

    Ok(report_path)
}

/// Load a report, refusing it if the bytes do not match the stored digest.
pub fn read_report(output_dir: &Path, run_id: &str) -> Result<PipelineReport> {
    let dir = run_dir(output_dir, run_id);
    let json = std::fs::read(dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(dir.join(DIGEST_FILE))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(PortError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;

    fn report() -> PipelineReport {
        let now = Utc::now();
        PipelineReport {
            run_id: "run-1".to_string(),
            component_id: "site/card".to_string(),
            display_name: "Card".to_string(),
            review_passed: false,
            iterations: 2,
            max_iterations: 2,
            artifact_path: PathBuf::from("/out/Card.jsx"),
            style_path: None,
            review_summary: "1/2 checks passed; failing: build (high)".to_string(),
            findings: vec![
                ReviewFinding::pass("security"),
                ReviewFinding::fail("build", Severity::High, "missing export"),
            ],
            dependencies: vec!["site/title".to_string()],
            reused_artifacts: vec![],
            unresolved_dependencies: vec!["site/ghost".to_string()],
            truncated_dependencies: vec![],
            cyclic_references: vec![],
            missing_classes: vec!["card__x".to_string()],
            analysis_failures: vec![],
            stages: vec![],
            started_at: now,
            finished_at: now,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_report_roundtrip_with_digest() {
        let dir = tempfile::tempdir().unwrap();
        let original = report();
        let path = write_report(dir.path(), &original).unwrap();
        assert!(path.ends_with("runs/run-1/report.json"));
        let loaded = read_report(dir.path(), "run-1").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_tampered_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), &report()).unwrap();
        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"review_passed\": false", "\"review_passed\": true");
        std::fs::write(&path, tampered).unwrap();

        let err = read_report(dir.path(), "run-1").unwrap_err();
        assert!(matches!(err, PortError::DigestMismatch { .. }));
    }

    #[test]
    fn test_summary_and_markdown() {
        let r = report();
        assert!(r.summary_line().starts_with("site/card FAILED after 2 of 2"));
        let md = r.to_markdown();
        assert!(md.contains("| build | no | high | missing export |"));
        assert!(md.contains("## Unresolved dependencies"));
        assert!(!md.contains("## Reused artifacts"));
    }
}
