//! Maps logical component identifiers to repository directories.

use std::path::{Path, PathBuf};

/// Resolves `site/components/card`-style identifiers against a content
/// repository laid out with `apps/` and `libs/` overlays.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    repo_root: PathBuf,
}

impl ResourceLocator {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Canonical form of an identifier: no leading slash, no `apps/` or
    /// `libs/` prefix, no trailing slash. `None` for empty ids or ids that
    /// would escape the repository.
    pub fn normalize(id: &str) -> Option<String> {
        let trimmed = id.trim().trim_matches('/');
        let trimmed = trimmed
            .strip_prefix("apps/")
            .or_else(|| trimmed.strip_prefix("libs/"))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return None;
        }
        if trimmed
            .split('/')
            .any(|seg| seg == ".." || seg == "." || seg.is_empty())
        {
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Directory for `id`, probing `apps/`, then `libs/`, then the repo root.
    pub fn locate(&self, id: &str) -> Option<PathBuf> {
        let normalized = Self::normalize(id)?;
        self.candidates(&normalized)
            .into_iter()
            .find(|candidate| candidate.is_dir())
    }

    fn candidates(&self, normalized: &str) -> Vec<PathBuf> {
        vec![
            self.repo_root.join("apps").join(normalized),
            self.repo_root.join("libs").join(normalized),
            self.repo_root.join(normalized),
        ]
    }

    /// Path relative to the repository root for display, or the path itself.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
