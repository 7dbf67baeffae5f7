//! Run configuration and startup validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{PortError, Result, Severity};
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub repo_root: PathBuf,
    pub output_dir: PathBuf,
    /// Repair cycles allowed after the first review.
    pub max_iterations: u32,
    pub max_dependency_depth: usize,
    /// Findings at or above this severity fail the gate.
    pub severity_threshold: Severity,
    pub retry: RetryPolicy,
    /// Extension of generated component files.
    pub artifact_extension: String,
    /// Design-library checkout used to locate suggested components.
    #[serde(default)]
    pub design_library: Option<PathBuf>,
}

impl PortConfig {
    pub fn new(repo_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            output_dir: output_dir.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_dependency_depth: DEFAULT_MAX_DEPTH,
            severity_threshold: Severity::High,
            retry: RetryPolicy::DEFAULT,
            artifact_extension: "jsx".to_string(),
            design_library: None,
        }
    }

    /// Every problem with this configuration; empty when runnable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.repo_root.as_os_str().is_empty() {
            problems.push("repository root is not set".to_string());
        } else if !self.repo_root.exists() {
            problems.push(format!(
                "repository root does not exist: {}",
                self.repo_root.display()
            ));
        } else if !self.repo_root.is_dir() {
            problems.push(format!(
                "repository root is not a directory: {}",
                self.repo_root.display()
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            problems.push("output directory is not set".to_string());
        } else if self.output_dir.exists() {
            if !self.output_dir.is_dir() {
                problems.push(format!(
                    "output path is not a directory: {}",
                    self.output_dir.display()
                ));
            }
        } else if !creatable(&self.output_dir) {
            problems.push(format!(
                "output directory cannot be created: {}",
                self.output_dir.display()
            ));
        }

        if let Some(library) = &self.design_library {
            if !library.is_dir() {
                problems.push(format!(
                    "design library is not a directory: {}",
                    library.display()
                ));
            }
        }

        let ext = self.artifact_extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains('/') {
            problems.push(format!(
                "invalid artifact extension: {:?}",
                self.artifact_extension
            ));
        }
        if self.severity_threshold == Severity::None {
            problems.push("severity threshold `none` would fail every finding".to_string());
        }
        problems.extend(self.retry.problems());
        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PortError::Config { problems })
        }
    }
}

/// Whether the nearest existing ancestor of `path` is a directory.
fn creatable(path: &Path) -> bool {
    path.ancestors()
        .skip(1)
        .find(|a| !a.as_os_str().is_empty() && a.exists())
        .map(|a| a.is_dir())
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let repo = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = PortConfig::new(repo.path(), out.path().join("new-subdir"));
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 5);
    }

    #[test]
    fn test_every_problem_is_reported() {
        let out = tempfile::tempdir().unwrap();
        let file = out.path().join("taken");
        std::fs::write(&file, "x").unwrap();

        let mut config = PortConfig::new(out.path().join("no-such-repo"), &file);
        config.artifact_extension = String::new();
        let err = config.validate().unwrap_err();
        match err {
            PortError::Config { problems } => {
                assert_eq!(problems.len(), 3, "{problems:?}");
                assert!(problems[0].contains("repository root does not exist"));
                assert!(problems[1].contains("not a directory"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_design_library_is_a_problem() {
        let repo = tempfile::tempdir().unwrap();
        let mut config = PortConfig::new(repo.path(), repo.path().join("out"));
        config.design_library = Some(repo.path().join("no-such-library"));
        let problems = config.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("design library"));

        config.design_library = Some(repo.path().to_path_buf());
        assert!(config.problems().is_empty());
    }

    #[test]
    fn test_output_under_a_file_is_not_creatable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "").unwrap();
        let config = PortConfig::new(dir.path(), file.join("out"));
        assert!(config
            .problems()
            .iter()
            .any(|p| p.contains("cannot be created")));
    }
}
