//! Recursive component dependency discovery.
//!
//! References are read from each component's markup (`data-sly-resource`
//! resource types) and node definition (`sling:resourceSuperType`). Cycle
//! detection uses the ancestors of the current branch only, so a component
//! shared by two siblings is expanded under both.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{
    classify, ComponentNode, CycleSkip, DependencyResolution, FileKind, PortError, Result,
    UnresolvedReference,
};
use crate::locator::ResourceLocator;
use crate::markup;

/// Directories never treated as component sources.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target"];

/// All files under a component directory in file-name order.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && SKIPPED_DIRS
                    .iter()
                    .any(|skip| e.file_name().to_string_lossy() == *skip))
        });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Component references declared by a node's files, in discovery order.
pub fn references_in(dir: &Path, files: &[PathBuf]) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        if let Some(id) = ResourceLocator::normalize(raw) {
            if !refs.contains(&id) {
                refs.push(id);
            }
        }
    };
    for file in files {
        let kind = classify(file);
        let own_definition = kind == FileKind::Config && file.parent() == Some(dir);
        if kind != FileKind::Markup && !own_definition {
            continue;
        }
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        if own_definition {
            if let Some(super_type) = markup::extract_super_type(&text) {
                push(&super_type);
            }
        } else {
            for reference in markup::extract_component_references(&text) {
                push(&reference);
            }
        }
    }
    refs
}

#[derive(Default)]
struct Findings {
    unresolved: Vec<UnresolvedReference>,
    truncated: Vec<String>,
    cycles: Vec<CycleSkip>,
}

/// Builds cycle-free dependency trees rooted at a component.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    locator: ResourceLocator,
}

impl DependencyResolver {
    pub fn new(locator: ResourceLocator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Locate `root_id` and resolve it.
    pub fn resolve_id(&self, root_id: &str, max_depth: usize) -> Result<DependencyResolution> {
        let path = self
            .locator
            .locate(root_id)
            .ok_or_else(|| PortError::ComponentNotFound(root_id.to_string()))?;
        self.resolve(root_id, &path, max_depth)
    }

    /// Resolve the tree below `root_path`, following references at most
    /// `max_depth` levels. Unresolvable references, cycles and truncation
    /// are reported in the result, never as errors.
    pub fn resolve(
        &self,
        root_id: &str,
        root_path: &Path,
        max_depth: usize,
    ) -> Result<DependencyResolution> {
        if !root_path.is_dir() {
            return Err(PortError::ComponentNotFound(root_id.to_string()));
        }
        let id = ResourceLocator::normalize(root_id).unwrap_or_else(|| root_id.to_string());
        let mut ancestors = Vec::new();
        let mut findings = Findings::default();
        let root = self.build(&id, root_path, max_depth, &mut ancestors, &mut findings)?;

        debug!(
            component = %id,
            dependencies = root.dependency_ids().len(),
            unresolved = findings.unresolved.len(),
            cycles = findings.cycles.len(),
            "dependency resolution finished"
        );
        Ok(DependencyResolution {
            root,
            unresolved: findings.unresolved,
            truncated: findings.truncated,
            cycles: findings.cycles,
        })
    }

    fn build(
        &self,
        id: &str,
        path: &Path,
        depth_left: usize,
        ancestors: &mut Vec<String>,
        findings: &mut Findings,
    ) -> Result<ComponentNode> {
        let files = collect_files(path)?;
        let references = references_in(path, &files);
        let mut node = ComponentNode::new(id, path, files);

        if references.is_empty() {
            return Ok(node);
        }
        if depth_left == 0 {
            info!(component = %id, skipped = references.len(), "dependency depth limit reached");
            findings.truncated.push(id.to_string());
            return Ok(node);
        }

        ancestors.push(id.to_string());
        for reference in references {
            if reference == id || ancestors.contains(&reference) {
                let mut cycle_path = ancestors.clone();
                cycle_path.push(reference.clone());
                debug!(component = %id, reference = %reference, "skipping cyclic reference");
                findings.cycles.push(CycleSkip {
                    id: reference,
                    path: cycle_path,
                });
                continue;
            }
            match self.locator.locate(&reference) {
                Some(dep_path) => {
                    let child =
                        self.build(&reference, &dep_path, depth_left - 1, ancestors, findings)?;
                    node.dependencies.insert(reference, child);
                }
                None => {
                    warn!(
                        component = %id,
                        reference = %reference,
                        "unresolved component reference"
                    );
                    findings.unresolved.push(UnresolvedReference {
                        id: reference,
                        referenced_by: id.to_string(),
                        reason: "not found under apps/, libs/ or repository root".to_string(),
                    });
                }
            }
        }
        ancestors.pop();

        Ok(node)
    }
}
