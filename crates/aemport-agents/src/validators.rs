//! Review checks: a static source scan, a build command, and model-backed
//! reviews with fixed focus areas.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use aemport_core::{
    CollaboratorError, CollaboratorOutput, ReviewFinding, ReviewRequest, Severity, Validator,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::client::ChatModel;
use crate::json::parse_reply;
use crate::prompts::{
    review_prompt, BEHAVIOR_FOCUS, DESIGN_FOCUS, PROPS_FOCUS, REVIEW_FORMAT, SECURITY_FOCUS,
    STYLE_FOCUS,
};

static COMPONENT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:function|const|let|class)\s+[A-Z][A-Za-z0-9_]*").expect("valid regex")
});

static EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+(?:default\b|\{|const\b|function\b|class\b)").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Static syntax scan
// ---------------------------------------------------------------------------

/// Counts of `()`, `{}` and `[]` outside comments and string literals.
/// Quoted strings end at a newline so stray apostrophes in JSX text only
/// affect their own line.
fn bracket_balance(source: &str) -> [(char, char, i64); 3] {
    let mut balance = [('(', ')', 0i64), ('{', '}', 0), ('[', ']', 0)];
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '\'' | '"' | '`' => {
                let quote = c;
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 1,
                        '\n' if quote != '`' => break,
                        ch if ch == quote => break,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => {
                for (open, close, count) in balance.iter_mut() {
                    if c == *open {
                        *count += 1;
                    } else if c == *close {
                        *count -= 1;
                    }
                }
            }
        }
        i += 1;
    }
    balance
}

/// Cheap structural checks on generated source. Needs no collaborator.
#[derive(Debug, Clone)]
pub struct StaticSyntaxValidator {
    name: String,
}

impl Default for StaticSyntaxValidator {
    fn default() -> Self {
        Self {
            name: "syntax".to_string(),
        }
    }
}

impl StaticSyntaxValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Findings for `source`; errors fail the check, warnings only raise severity.
    pub fn inspect(&self, source: &str) -> ReviewFinding {
        if source.trim().is_empty() {
            return ReviewFinding::fail(&self.name, Severity::Critical, "source is empty");
        }

        let mut errors = Vec::new();
        let mut warnings: Vec<(Severity, String)> = Vec::new();

        if source.trim_start().starts_with("```") {
            errors.push("source is still wrapped in a markdown fence".to_string());
        }
        for (open, close, count) in bracket_balance(source) {
            if count != 0 {
                errors.push(format!("unbalanced `{open}{close}`: {count:+} open"));
            }
        }
        if !EXPORT.is_match(source) {
            errors.push("module exports nothing".to_string());
        }
        if !COMPONENT_DECL.is_match(source) {
            warnings.push((Severity::Low, "no capitalised component declaration".to_string()));
        }
        if source.contains("dangerouslySetInnerHTML") {
            if !source.contains("__html") {
                errors.push("dangerouslySetInnerHTML without an __html value".to_string());
            } else if !(source.contains("sanitize") || source.contains("DOMPurify")) {
                warnings.push((
                    Severity::Medium,
                    "dangerouslySetInnerHTML with unsanitised input".to_string(),
                ));
            }
        }

        let passed = errors.is_empty();
        let severity = if passed {
            warnings
                .iter()
                .map(|(s, _)| *s)
                .max()
                .unwrap_or(Severity::None)
        } else {
            Severity::High
        };
        let mut issues = errors;
        issues.extend(warnings.into_iter().map(|(s, w)| format!("{s}: {w}")));
        ReviewFinding {
            check_name: self.name.clone(),
            passed,
            severity,
            issues,
            recommendations: Vec::new(),
            details: None,
        }
    }
}

#[async_trait]
impl Validator for StaticSyntaxValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, request: &ReviewRequest) -> CollaboratorOutput<ReviewFinding> {
        CollaboratorOutput::Structured(self.inspect(&request.source))
    }
}

// ---------------------------------------------------------------------------
// Build command
// ---------------------------------------------------------------------------

/// Lines of command output kept in a finding.
const OUTPUT_TAIL_LINES: usize = 40;

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// Runs a build command (for example `npm run build`) against the output
/// directory. A non-zero exit fails the check at `high`.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    name: String,
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            name: "build".to_string(),
            command,
            working_dir: None,
            timeout: Duration::from_secs(300),
        }
    }

    /// Whitespace-split command line; `None` when blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let command: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            None
        } else {
            Some(Self::new(command))
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Run here instead of the artifact's directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, request: &ReviewRequest) -> CollaboratorOutput<ReviewFinding> {
        let Some((exe, args)) = self.command.split_first() else {
            return CollaboratorOutput::Failed(CollaboratorError::InvalidConfig(
                "build command is empty".to_string(),
            ));
        };
        let cwd = self
            .working_dir
            .clone()
            .or_else(|| request.artifact_path.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        debug!(command = %self.command_line(), cwd = %cwd.display(), "running build check");
        let child = match Command::new(exe)
            .args(args)
            .current_dir(&cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CollaboratorOutput::Failed(CollaboratorError::InvalidConfig(format!(
                    "build command not found: {exe}"
                )));
            }
            Err(e) => return CollaboratorOutput::Failed(CollaboratorError::Other(e.to_string())),
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CollaboratorOutput::Failed(CollaboratorError::Other(e.to_string()))
            }
            Err(_) => {
                warn!(
                    command = %self.command_line(),
                    timeout_secs = self.timeout.as_secs(),
                    "build check timed out"
                );
                return CollaboratorOutput::Failed(CollaboratorError::Timeout(format!(
                    "`{}` did not finish within {}s",
                    self.command_line(),
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            let mut finding = ReviewFinding::pass(&self.name);
            finding.details = Some(tail(&stdout, OUTPUT_TAIL_LINES));
            return CollaboratorOutput::Structured(finding);
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "a signal".to_string());
        let mut finding = ReviewFinding::fail(
            &self.name,
            Severity::High,
            format!("`{}` exited with {code}", self.command_line()),
        )
        .with_recommendation("fix the compiler errors reported in the details");
        finding.details = Some(tail(&format!("{stderr}\n{stdout}"), OUTPUT_TAIL_LINES));
        CollaboratorOutput::Structured(finding)
    }
}

// ---------------------------------------------------------------------------
// Model-backed review
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VerdictDoc {
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    issues: Vec<Value>,
    #[serde(default)]
    recommendations: Vec<Value>,
}

fn text_items(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

impl VerdictDoc {
    /// A missing `passed` counts as a failure.
    fn into_finding(self, check_name: &str) -> ReviewFinding {
        let passed = self.passed.unwrap_or(false);
        let severity = match self.severity.as_deref() {
            Some(label) => Severity::parse_lenient(label),
            None if passed => Severity::None,
            None => Severity::High,
        };
        ReviewFinding {
            check_name: check_name.to_string(),
            passed,
            severity,
            issues: text_items(self.issues),
            recommendations: text_items(self.recommendations),
            details: None,
        }
    }
}

/// One review check answered by a chat model with a fixed focus.
pub struct LlmValidator {
    name: String,
    focus: String,
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl LlmValidator {
    pub fn new(name: &str, focus: &str, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: name.to_string(),
            focus: focus.to_string(),
            model,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn security(model: Arc<dyn ChatModel>) -> Self {
        Self::new("security", SECURITY_FOCUS, model)
    }

    pub fn style_consistency(model: Arc<dyn ChatModel>) -> Self {
        Self::new("style_consistency", STYLE_FOCUS, model)
    }

    pub fn props_consistency(model: Arc<dyn ChatModel>) -> Self {
        Self::new("props_consistency", PROPS_FOCUS, model)
    }

    pub fn behavior_consistency(model: Arc<dyn ChatModel>) -> Self {
        Self::new("behavior_consistency", BEHAVIOR_FOCUS, model)
    }

    pub fn design_system(model: Arc<dyn ChatModel>) -> Self {
        Self::new("design_system", DESIGN_FOCUS, model)
    }

    /// Every focus area.
    pub fn presets(model: Arc<dyn ChatModel>) -> Vec<Self> {
        vec![
            Self::security(model.clone()),
            Self::style_consistency(model.clone()),
            Self::props_consistency(model.clone()),
            Self::behavior_consistency(model.clone()),
            Self::design_system(model),
        ]
    }
}

#[async_trait]
impl Validator for LlmValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, request: &ReviewRequest) -> CollaboratorOutput<ReviewFinding> {
        let system = format!("{}\n\n{}", self.focus, REVIEW_FORMAT);
        let reply = match self
            .model
            .complete(&system, &review_prompt(request), self.temperature)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return CollaboratorOutput::Failed(e),
        };
        parse_reply::<VerdictDoc>(&reply).map(|doc| doc.into_finding(&self.name))
    }
}
