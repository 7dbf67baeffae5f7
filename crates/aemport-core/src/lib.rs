//! aemport core library
//!
//! Control plane for converting AEM components into React components:
//! dependency graph resolution, style cascade resolution, design-library
//! hints, the artifact registry, the review gate and the
//! generate/review/repair state machine.

pub mod collaborator;
pub mod config;
pub mod dependency;
pub mod design;
pub mod domain;
pub mod fakes;
pub mod locator;
pub mod markup;
pub mod obs;
pub mod pipeline;
pub mod registry;
pub mod reporting;
pub mod retry;
pub mod review;
pub mod style;
pub mod telemetry;

pub use collaborator::{
    extract_code_block, infer_manifest, AnalysisRequest, ArtifactManifest, CodeGenerator,
    CodeRepairer, CollaboratorOutput, FileAnalyzer, GeneratedArtifact, GenerationRequest,
    RepairRequest, ReviewRequest, Validator,
};
pub use config::PortConfig;
pub use dependency::{collect_files, DependencyResolver};
pub use design::{DesignHint, DesignLibrary};
pub use domain::{
    display_name, CollaboratorError, ComponentNode, DependencyResolution, FileAnalysis, FileKind,
    PortError, Result, ReviewFinding, Severity, StyleBundleDescriptor, StyleResolution, StyleRule,
    StyleSource, StyleSummary,
};
pub use locator::ResourceLocator;
pub use pipeline::{
    next_after_review, Collaborators, PipelineOrchestrator, PipelineStage, PipelineState,
};
pub use registry::{ArtifactRegistry, RegistryEntry, REGISTRY_FILE};
pub use reporting::{read_report, write_report, PipelineReport};
pub use retry::{classify_error, ErrorClass, RetryOutcome, RetryPolicy};
pub use review::{aggregate_findings, ReviewAggregator, ReviewVerdict};
pub use style::{BundleIndex, StyleCascadeResolver};
pub use telemetry::init_tracing;

/// Crate version, for report headers and `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
