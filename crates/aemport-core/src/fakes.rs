//! Scripted in-memory collaborators (testing only).
//!
//! Each fake records how often it was called and answers from a script,
//! falling back to a fixed default once the script is used up.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborator::{
    infer_manifest, AnalysisRequest, CodeGenerator, CodeRepairer, CollaboratorOutput,
    FileAnalyzer, GeneratedArtifact, GenerationRequest, RepairRequest, ReviewRequest, Validator,
};
use crate::domain::{CollaboratorError, ReviewFinding, Severity};

/// Minimal component source for `name`.
pub fn component_source(name: &str, marker: &str) -> String {
    format!(
        "import React from 'react';\n\n// {marker}\nexport default function {name}(props) {{\n  return <div className=\"{name}\">{{props.children}}</div>;\n}}\n"
    )
}

// ---------------------------------------------------------------------------
// ScriptedAnalyzer
// ---------------------------------------------------------------------------

/// Analyzer that succeeds except for files whose name is listed as failing.
#[derive(Debug, Default)]
pub struct ScriptedAnalyzer {
    failing_files: BTreeSet<String>,
    fail_all: bool,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing_files: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_all() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> CollaboratorOutput<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let file = request
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.fail_all || self.failing_files.contains(&file) {
            return CollaboratorOutput::Failed(CollaboratorError::MalformedInput(format!(
                "cannot analyze {file}"
            )));
        }
        CollaboratorOutput::Structured(serde_json::json!({
            "file": file,
            "kind": request.kind.label(),
            "length": request.content.len(),
        }))
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Generator answering from a script, then with a default component.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<CollaboratorOutput<GeneratedArtifact>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(outputs: Vec<CollaboratorOutput<GeneratedArtifact>>) -> Self {
        Self {
            script: Mutex::new(outputs.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> CollaboratorOutput<GeneratedArtifact> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let source = component_source(&request.display_name, "generated");
        CollaboratorOutput::Structured(GeneratedArtifact {
            manifest: infer_manifest(&source, &request.display_name),
            source,
            style_source: Some(format!(".{} {{ display: block; }}\n", request.display_name)),
            notes: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedRepairer
// ---------------------------------------------------------------------------

/// Repairer answering from a script, then with a source marked by iteration.
#[derive(Debug, Default)]
pub struct ScriptedRepairer {
    script: Mutex<VecDeque<CollaboratorOutput<GeneratedArtifact>>>,
    calls: AtomicUsize,
}

impl ScriptedRepairer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(outputs: Vec<CollaboratorOutput<GeneratedArtifact>>) -> Self {
        Self {
            script: Mutex::new(outputs.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeRepairer for ScriptedRepairer {
    async fn repair(&self, request: &RepairRequest) -> CollaboratorOutput<GeneratedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let marker = format!("repaired at iteration {}", request.iteration);
        let source = component_source(&request.display_name, &marker);
        CollaboratorOutput::Structured(GeneratedArtifact {
            manifest: infer_manifest(&source, &request.display_name),
            source,
            style_source: None,
            notes: vec![marker],
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedValidator
// ---------------------------------------------------------------------------

/// Validator answering from a script, then with a fixed verdict.
#[derive(Debug)]
pub struct ScriptedValidator {
    name: String,
    script: Mutex<VecDeque<CollaboratorOutput<ReviewFinding>>>,
    fallback: CollaboratorOutput<ReviewFinding>,
    seen_sources: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn new(
        name: &str,
        script: Vec<CollaboratorOutput<ReviewFinding>>,
        fallback: CollaboratorOutput<ReviewFinding>,
    ) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            seen_sources: Mutex::new(Vec::new()),
        }
    }

    pub fn always_pass(name: &str) -> Self {
        Self::new(
            name,
            Vec::new(),
            CollaboratorOutput::Structured(ReviewFinding::pass(name)),
        )
    }

    pub fn always_fail(name: &str, severity: Severity) -> Self {
        Self::new(
            name,
            Vec::new(),
            CollaboratorOutput::Structured(ReviewFinding::fail(name, severity, "still failing")),
        )
    }

    /// Fails the first `failures` reviews, then passes.
    pub fn passes_after(name: &str, failures: usize) -> Self {
        let script = (0..failures)
            .map(|_| {
                CollaboratorOutput::Structured(ReviewFinding::fail(
                    name,
                    Severity::Medium,
                    "needs another pass",
                ))
            })
            .collect();
        Self::new(
            name,
            script,
            CollaboratorOutput::Structured(ReviewFinding::pass(name)),
        )
    }

    /// Number of reviews performed.
    pub fn calls(&self) -> usize {
        self.seen_sources.lock().unwrap().len()
    }

    /// Candidate sources in the order they were reviewed.
    pub fn seen_sources(&self) -> Vec<String> {
        self.seen_sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, request: &ReviewRequest) -> CollaboratorOutput<ReviewFinding> {
        self.seen_sources.lock().unwrap().push(request.source.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(next) => next,
            None => self.fallback.clone(),
        }
    }
}
