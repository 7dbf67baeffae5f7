//! Conversion state machine:
//! `Collecting -> Analyzing -> ResolvingDependencies -> Generating ->
//! Reviewing -> (Repairing -> Reviewing)* -> Done`.
//!
//! Stages run one at a time. The loop ends when review passes or after
//! `max_iterations` repair cycles, whichever comes first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::collaborator::{
    AnalysisRequest, CodeGenerator, CodeRepairer, CollaboratorOutput, FileAnalyzer,
    GeneratedArtifact, GenerationRequest, RepairRequest, ReviewRequest,
};
use crate::config::PortConfig;
use crate::dependency::{collect_files, DependencyResolver};
use crate::design::DesignLibrary;
use crate::domain::{
    display_name, select_for_analysis, FileAnalysis, FileKind, PortError, Result, ReviewFinding,
    Severity, StyleSummary,
};
use crate::locator::ResourceLocator;
use crate::obs;
use crate::registry::{ArtifactRegistry, RegistryEntry};
use crate::reporting::{write_report, PipelineReport};
use crate::retry::{classify_error, ErrorClass, RetryPolicy};
use crate::review::ReviewAggregator;
use crate::style::StyleCascadeResolver;

/// Files analysed when a component has none of the primary kinds.
const FALLBACK_ANALYSIS_FILES: usize = 5;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Collecting,
    Analyzing,
    ResolvingDependencies,
    Generating,
    Reviewing,
    Repairing,
    Done,
}

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Collecting => "collecting",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::ResolvingDependencies => "resolving_dependencies",
            PipelineStage::Generating => "generating",
            PipelineStage::Reviewing => "reviewing",
            PipelineStage::Repairing => "repairing",
            PipelineStage::Done => "done",
        }
    }
}

/// Transition out of `Reviewing`.
pub fn next_after_review(passed: bool, iteration: u32, max_iterations: u32) -> PipelineStage {
    if passed || iteration >= max_iterations {
        PipelineStage::Done
    } else {
        PipelineStage::Repairing
    }
}

/// One entry in the stage history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: PipelineStage,
    pub iteration: u32,
    pub entered_at: DateTime<Utc>,
}

/// Mutable state of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub component_id: String,
    pub stage: PipelineStage,
    pub candidate_artifact: String,
    pub review_findings: BTreeMap<String, ReviewFinding>,
    pub review_passed: bool,
    /// Completed repair cycles.
    pub iteration: u32,
    pub max_iterations: u32,
    pub transitions: Vec<StageTransition>,
}

impl PipelineState {
    pub fn new(component_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            component_id: component_id.into(),
            stage: PipelineStage::Collecting,
            candidate_artifact: String::new(),
            review_findings: BTreeMap::new(),
            review_passed: false,
            iteration: 0,
            max_iterations,
            transitions: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.transitions.push(StageTransition {
            stage,
            iteration: self.iteration,
            entered_at: Utc::now(),
        });
        obs::emit_stage_entered(stage.label(), self.iteration);
    }

    fn record_review(&mut self, findings: Vec<ReviewFinding>, passed: bool) {
        self.review_findings = findings
            .into_iter()
            .map(|f| (f.check_name.clone(), f))
            .collect();
        self.review_passed = passed;
    }

    /// Findings that keep the gate closed at `threshold`.
    pub fn failing_findings(&self, threshold: Severity) -> Vec<ReviewFinding> {
        self.review_findings
            .values()
            .filter(|f| !f.clears(threshold))
            .cloned()
            .collect()
    }

    pub fn count(&self, stage: PipelineStage) -> usize {
        self.transitions.iter().filter(|t| t.stage == stage).count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// External collaborators used by a run.
pub struct Collaborators {
    pub analyzer: Arc<dyn FileAnalyzer>,
    pub generator: Arc<dyn CodeGenerator>,
    pub repairer: Arc<dyn CodeRepairer>,
    pub reviewer: ReviewAggregator,
}

/// Paths a candidate was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WrittenArtifact {
    artifact_path: PathBuf,
    style_path: Option<PathBuf>,
}

/// Everything gathered before generation.
struct Prepared {
    analyses: Vec<FileAnalysis>,
    dependency_analyses: BTreeMap<String, Vec<FileAnalysis>>,
    dependency_ids: Vec<String>,
    unresolved: Vec<String>,
    truncated: Vec<String>,
    cyclic: Vec<String>,
    styles: StyleSummary,
    existing: Vec<RegistryEntry>,
}

/// Drives conversions against one repository and one output directory.
pub struct PipelineOrchestrator {
    config: PortConfig,
    locator: ResourceLocator,
    dependencies: DependencyResolver,
    styles: StyleCascadeResolver,
    design: DesignLibrary,
    registry: ArtifactRegistry,
    collaborators: Collaborators,
}

impl PipelineOrchestrator {
    /// Validate configuration, create the output directory and load the registry.
    pub fn new(config: PortConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)?;
        let locator = ResourceLocator::new(&config.repo_root);
        let registry = ArtifactRegistry::in_output_dir(&config.output_dir)?;
        Ok(Self {
            dependencies: DependencyResolver::new(locator.clone()),
            styles: StyleCascadeResolver::new(locator.clone()),
            design: DesignLibrary::from_config(config.design_library.as_deref()),
            locator,
            registry,
            config,
            collaborators,
        })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn registry(&mut self) -> &mut ArtifactRegistry {
        &mut self.registry
    }

    /// Convert one component. Returns a report for both passing and
    /// non-passing runs; `Err` only for fatal failures.
    pub async fn run(&mut self, component_id: &str) -> Result<PipelineReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let id = ResourceLocator::normalize(component_id)
            .ok_or_else(|| PortError::ComponentNotFound(component_id.to_string()))?;
        let span = obs::run_span(&run_id, &id);
        self.execute(run_id, id).instrument(span).await
    }

    async fn execute(&mut self, run_id: String, id: String) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        obs::emit_pipeline_started(&run_id, &id, self.config.max_iterations);

        let mut state = PipelineState::new(&id, self.config.max_iterations);
        let name = display_name(&id);

        state.enter(PipelineStage::Collecting);
        let root_path = self
            .locator
            .locate(&id)
            .ok_or_else(|| PortError::ComponentNotFound(id.clone()))?;
        let files = collect_files(&root_path)?;
        if files.is_empty() {
            return Err(PortError::NoFiles(id));
        }
        debug!(files = files.len(), "collected component files");

        state.enter(PipelineStage::Analyzing);
        let selected = select_for_analysis(&files, FALLBACK_ANALYSIS_FILES);
        let analyses = self.analyze_files(&id, selected).await;
        if analyses.iter().all(FileAnalysis::is_placeholder) {
            return Err(PortError::AllAnalysesFailed(id));
        }

        state.enter(PipelineStage::ResolvingDependencies);
        let prepared = self.prepare(&id, &root_path, analyses).await?;

        state.enter(PipelineStage::Generating);
        let design_hints = self.design.hints_for(&id, &files);
        debug!(hints = design_hints.len(), "design library hints");
        let request = GenerationRequest {
            component_id: id.clone(),
            display_name: name.clone(),
            analyses: prepared.analyses.clone(),
            dependency_analyses: prepared.dependency_analyses.clone(),
            styles: prepared.styles.clone(),
            existing_dependencies: prepared.existing.clone(),
            unresolved_dependencies: prepared.unresolved.clone(),
            design_hints,
        };
        let mut artifact = self.generate(&request).await?;
        let mut written = self.write_artifact(&name, &artifact)?;

        let mut last_summary;
        loop {
            state.enter(PipelineStage::Reviewing);
            state.candidate_artifact = artifact.source.clone();
            let review_request = ReviewRequest {
                component_id: id.clone(),
                display_name: name.clone(),
                artifact_path: written.artifact_path.clone(),
                source: artifact.source.clone(),
                style_source: artifact.style_source.clone(),
                iteration: state.iteration,
            };
            let reviewer = &self.collaborators.reviewer;
            let findings = reviewer.run_checks(&review_request).await;
            let verdict = reviewer.aggregate(&findings);
            obs::emit_review_evaluated(
                state.iteration,
                verdict.passed,
                verdict.failing_checks.len(),
                verdict.worst_severity,
            );
            state.record_review(findings, verdict.passed);
            last_summary = verdict.summary;

            match next_after_review(verdict.passed, state.iteration, state.max_iterations) {
                PipelineStage::Done => break,
                _ => {
                    state.enter(PipelineStage::Repairing);
                    let repaired = self.repair(&id, &name, &artifact, &state).await;
                    // counts even when the repairer produced nothing
                    state.iteration += 1;
                    obs::emit_repair_applied(state.iteration, repaired.is_some());
                    if let Some(next) = repaired {
                        artifact = next;
                        written = self.write_artifact(&name, &artifact)?;
                    }
                }
            }
        }
        state.enter(PipelineStage::Done);

        if state.review_passed {
            self.registry.put(RegistryEntry {
                component_id: id.clone(),
                artifact_path: written.artifact_path.clone(),
                style_path: written.style_path.clone(),
                display_name: name.clone(),
            })?;
        } else {
            info!(component = %id, "review did not pass; artifact left unregistered");
        }

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;
        let report = PipelineReport {
            run_id: run_id.clone(),
            component_id: id,
            display_name: name,
            review_passed: state.review_passed,
            iterations: state.iteration,
            max_iterations: state.max_iterations,
            artifact_path: written.artifact_path,
            style_path: written.style_path,
            review_summary: last_summary,
            findings: state.review_findings.values().cloned().collect(),
            dependencies: prepared.dependency_ids,
            reused_artifacts: prepared
                .existing
                .iter()
                .map(|e| e.component_id.clone())
                .collect(),
            unresolved_dependencies: prepared.unresolved,
            truncated_dependencies: prepared.truncated,
            cyclic_references: prepared.cyclic,
            missing_classes: prepared.styles.missing_classes.iter().cloned().collect(),
            analysis_failures: prepared
                .analyses
                .iter()
                .filter(|a| a.is_placeholder())
                .map(|a| a.path.display().to_string())
                .collect(),
            stages: state.transitions,
            started_at,
            finished_at,
            duration_ms,
        };
        write_report(&self.config.output_dir, &report)?;
        obs::emit_pipeline_finished(&run_id, duration_ms, report.iterations, report.review_passed);
        Ok(report)
    }

    /// Analyse each selected file; failures become placeholders.
    async fn analyze_files(
        &self,
        component_id: &str,
        selected: Vec<(PathBuf, FileKind)>,
    ) -> Vec<FileAnalysis> {
        let analyzer: &dyn FileAnalyzer = self.collaborators.analyzer.as_ref();
        let retry: RetryPolicy = self.config.retry;
        let mut out = Vec::with_capacity(selected.len());
        for (path, kind) in selected {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot read file for analysis");
                    out.push(FileAnalysis::placeholder(path, kind, e.to_string()));
                    continue;
                }
            };
            let request = AnalysisRequest {
                component_id: component_id.to_string(),
                path: path.clone(),
                kind,
                content,
            };
            let request = &request;
            let analysis = match retry
                .run_output("analyze", move |_| analyzer.analyze(request))
                .await
            {
                CollaboratorOutput::Structured(value) => FileAnalysis::new(path, kind, value),
                CollaboratorOutput::Raw(text) => {
                    FileAnalysis::new(path, kind, serde_json::json!({ "summary": text }))
                }
                CollaboratorOutput::Failed(e) => {
                    warn!(file = %path.display(), error = %e, "file analysis failed");
                    FileAnalysis::placeholder(path, kind, e.to_string())
                }
            };
            out.push(analysis);
        }
        out
    }

    /// Dependency tree, dependency analyses, style hints and reusable artifacts.
    async fn prepare(
        &mut self,
        id: &str,
        root_path: &Path,
        analyses: Vec<FileAnalysis>,
    ) -> Result<Prepared> {
        let resolution = self
            .dependencies
            .resolve(id, root_path, self.config.max_dependency_depth)?;
        let mut unresolved = resolution.unresolved_ids();
        let mut dependency_ids = Vec::new();
        let mut dependency_analyses = BTreeMap::new();
        let mut styles = self.styles.summarize(root_path);

        let mut seen = Vec::new();
        for node in resolution.root.walk().into_iter().skip(1) {
            if seen.contains(&node.id) {
                continue;
            }
            seen.push(node.id.clone());

            let selected: Vec<(PathBuf, FileKind)> =
                select_for_analysis(&node.files, FALLBACK_ANALYSIS_FILES)
                    .into_iter()
                    .filter(|(_, kind)| matches!(kind, FileKind::Markup | FileKind::Dialog))
                    .collect();
            let dep_analyses = self.analyze_files(&node.id, selected).await;
            if !dep_analyses.is_empty() && dep_analyses.iter().all(FileAnalysis::is_placeholder) {
                warn!(dependency = %node.id, "all dependency analyses failed; marking unresolved");
                unresolved.push(node.id.clone());
                continue;
            }
            let dep_styles = self.styles.summarize(&node.path);
            styles.merge_dependency(&node.id, &dep_styles);
            dependency_analyses.insert(node.id.clone(), dep_analyses);
            dependency_ids.push(node.id.clone());
        }

        let existing = self.registry.existing_for(&dependency_ids)?;
        if !existing.is_empty() {
            info!(reused = existing.len(), "dependencies already generated");
        }

        Ok(Prepared {
            analyses,
            dependency_analyses,
            dependency_ids,
            unresolved,
            truncated: resolution.truncated,
            cyclic: resolution.cycles.into_iter().map(|c| c.path.join(" -> ")).collect(),
            styles,
            existing,
        })
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifact> {
        let generator: &dyn CodeGenerator = self.collaborators.generator.as_ref();
        let retry = self.config.retry;
        let output = retry
            .run_output("generate", move |_| generator.generate(request))
            .await;
        let generation_error = |reason: &str| PortError::Generation {
            component: request.component_id.clone(),
            reason: reason.to_string(),
        };
        let mut artifact = match output {
            CollaboratorOutput::Structured(artifact) => artifact,
            CollaboratorOutput::Raw(text) => {
                GeneratedArtifact::from_raw(&text, &request.display_name)
                    .ok_or_else(|| generation_error("response contained no code"))?
            }
            CollaboratorOutput::Failed(e) => {
                return Err(match classify_error(&e) {
                    ErrorClass::Retryable => PortError::RetriesExhausted {
                        operation: "generate".to_string(),
                        attempts: retry.max_attempts(),
                        last_error: e,
                    },
                    ErrorClass::Fatal => PortError::Collaborator(e),
                });
            }
        };
        if artifact.is_empty() {
            return Err(generation_error("generated source is empty"));
        }
        if artifact.manifest.entry_symbol.is_empty() {
            artifact.manifest =
                crate::collaborator::infer_manifest(&artifact.source, &request.display_name);
        }
        Ok(artifact)
    }

    /// One repair attempt. `None` when the repairer produced nothing usable.
    async fn repair(
        &self,
        id: &str,
        name: &str,
        artifact: &GeneratedArtifact,
        state: &PipelineState,
    ) -> Option<GeneratedArtifact> {
        let repairer: &dyn CodeRepairer = self.collaborators.repairer.as_ref();
        let request = RepairRequest {
            component_id: id.to_string(),
            display_name: name.to_string(),
            artifact: artifact.clone(),
            failing_findings: state.failing_findings(self.collaborators.reviewer.threshold()),
            iteration: state.iteration,
        };
        let request = &request;
        let output = self
            .config
            .retry
            .run_output("repair", move |_| repairer.repair(request))
            .await;
        let mut repaired = match output {
            CollaboratorOutput::Structured(next) => next,
            CollaboratorOutput::Raw(text) => GeneratedArtifact::from_raw(&text, name)?,
            CollaboratorOutput::Failed(e) => {
                warn!(
                    error = %e,
                    iteration = state.iteration,
                    "repair failed; keeping current candidate"
                );
                return None;
            }
        };
        if repaired.is_empty() {
            warn!(
                iteration = state.iteration,
                "repair returned empty source; keeping current candidate"
            );
            return None;
        }
        if repaired.style_source.is_none() {
            repaired.style_source = artifact.style_source.clone();
        }
        if repaired.manifest.entry_symbol.is_empty() {
            repaired.manifest = crate::collaborator::infer_manifest(&repaired.source, name);
        }
        Some(repaired)
    }

    /// Write the candidate (and its style module) into the output directory.
    fn write_artifact(&self, name: &str, artifact: &GeneratedArtifact) -> Result<WrittenArtifact> {
        let ext = self.config.artifact_extension.trim_start_matches('.');
        let artifact_path = self.config.output_dir.join(format!("{name}.{ext}"));
        std::fs::write(&artifact_path, &artifact.source)?;

        let style_path = match artifact.style_source.as_deref() {
            Some(css) if !css.trim().is_empty() => {
                let path = self.config.output_dir.join(format!("{name}.module.css"));
                std::fs::write(&path, css)?;
                Some(path)
            }
            _ => None,
        };
        Ok(WrittenArtifact {
            artifact_path,
            style_path,
        })
    }
}
