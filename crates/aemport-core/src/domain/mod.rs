//! Domain model for aemport: components, analyses, style data and review findings.

pub mod analysis;
pub mod component;
pub mod error;
pub mod review;
pub mod style;

pub use analysis::{classify, prioritize, select_for_analysis, FileAnalysis, FileKind};
pub use component::{
    display_name, ComponentNode, CycleSkip, DependencyResolution, UnresolvedReference,
};
pub use error::{CollaboratorError, PortError, Result};
pub use review::{ReviewFinding, Severity};
pub use style::{StyleBundleDescriptor, StyleResolution, StyleRule, StyleSource, StyleSummary};
