use std::path::PathBuf;
use std::sync::Arc;

use aemport_core::fakes::ScriptedValidator;
use aemport_core::{
    aggregate_findings, CollaboratorError, CollaboratorOutput, PortError, RetryPolicy,
    ReviewAggregator, ReviewFinding, ReviewRequest, Severity, Validator,
};

fn request() -> ReviewRequest {
    ReviewRequest {
        component_id: "site/card".to_string(),
        display_name: "Card".to_string(),
        artifact_path: PathBuf::from("out/Card.jsx"),
        source: "export default function Card() { return null; }".to_string(),
        style_source: None,
        iteration: 0,
    }
}

fn gate(validators: Vec<Arc<dyn Validator>>, retry: RetryPolicy) -> ReviewAggregator {
    ReviewAggregator::new(validators, Severity::High, retry).unwrap()
}

#[test]
fn passed_finding_with_critical_severity_fails_the_gate() {
    let mut finding = ReviewFinding::pass("security");
    finding.severity = Severity::Critical;
    let verdict = aggregate_findings(&[ReviewFinding::pass("style"), finding], Severity::High);

    assert!(!verdict.passed);
    assert_eq!(verdict.failing_checks, vec!["security"]);
    assert_eq!(verdict.worst_severity, Severity::Critical);
}

#[test]
fn failed_finding_with_low_severity_fails_the_gate() {
    let verdict = aggregate_findings(
        &[ReviewFinding::fail("props", Severity::Low, "prop renamed")],
        Severity::High,
    );
    assert!(!verdict.passed);
}

#[test]
fn no_findings_is_not_a_pass() {
    let verdict = aggregate_findings(&[], Severity::High);
    assert!(!verdict.passed);
    assert_eq!(verdict.checks, 0);
}

#[test]
fn duplicate_check_names_are_rejected() {
    let validators: Vec<Arc<dyn Validator>> = vec![
        Arc::new(ScriptedValidator::always_pass("security")),
        Arc::new(ScriptedValidator::always_pass("security")),
    ];
    let err = ReviewAggregator::new(validators, Severity::High, RetryPolicy::NONE).unwrap_err();
    assert!(matches!(err, PortError::DuplicateCheck(name) if name == "security"));
}

#[tokio::test]
async fn all_checks_passing_opens_the_gate() {
    let reviewer = gate(
        vec![
            Arc::new(ScriptedValidator::always_pass("security")),
            Arc::new(ScriptedValidator::always_pass("style_consistency")),
        ],
        RetryPolicy::NONE,
    );

    let findings = reviewer.run_checks(&request()).await;
    let verdict = reviewer.aggregate(&findings);

    assert!(verdict.passed);
    assert_eq!(verdict.summary, "2/2 checks passed");
}

#[tokio::test]
async fn unavailable_validator_counts_as_failing_high() {
    let down = ScriptedValidator::new(
        "props_consistency",
        Vec::new(),
        CollaboratorOutput::Failed(CollaboratorError::Unauthorized("bad key".to_string())),
    );
    let reviewer = gate(
        vec![
            Arc::new(ScriptedValidator::always_pass("security")),
            Arc::new(down),
        ],
        RetryPolicy::NONE,
    );

    let findings = reviewer.run_checks(&request()).await;
    let verdict = reviewer.aggregate(&findings);

    assert_eq!(findings.len(), 2);
    assert!(!verdict.passed);
    assert_eq!(verdict.failing_checks, vec!["props_consistency"]);
    assert_eq!(findings[1].severity, Severity::High);
}

#[tokio::test]
async fn unstructured_verdict_is_recorded_as_missing() {
    let chatty = ScriptedValidator::new(
        "behavior_consistency",
        Vec::new(),
        CollaboratorOutput::Raw("looks fine to me".to_string()),
    );
    let reviewer = gate(vec![Arc::new(chatty)], RetryPolicy::NONE);

    let findings = reviewer.run_checks(&request()).await;

    assert!(!findings[0].passed);
    assert_eq!(findings[0].details.as_deref(), Some("looks fine to me"));
}

#[test]
fn configured_check_without_finding_is_filled_in() {
    let reviewer = gate(
        vec![
            Arc::new(ScriptedValidator::always_pass("security")),
            Arc::new(ScriptedValidator::always_pass("style_consistency")),
        ],
        RetryPolicy::NONE,
    );

    let verdict = reviewer.aggregate(&[ReviewFinding::pass("security")]);

    assert!(!verdict.passed);
    assert_eq!(verdict.checks, 2);
    assert_eq!(verdict.failing_checks, vec!["style_consistency"]);
}

#[tokio::test(start_paused = true)]
async fn transient_validator_failure_is_retried() {
    let flaky = Arc::new(ScriptedValidator::new(
        "security",
        vec![CollaboratorOutput::Failed(CollaboratorError::Timeout(
            "slow".to_string(),
        ))],
        CollaboratorOutput::Structured(ReviewFinding::pass("security")),
    ));
    let as_dyn: Arc<dyn Validator> = flaky.clone();
    let reviewer = gate(vec![as_dyn], RetryPolicy::DEFAULT);

    let findings = reviewer.run_checks(&request()).await;

    assert!(findings[0].passed);
    assert_eq!(flaky.calls(), 2);
}
