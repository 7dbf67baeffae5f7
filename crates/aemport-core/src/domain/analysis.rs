//! Source file classification and per-file analysis results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Role a source file plays within a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// HTL / HTML template.
    Markup,
    /// Authoring dialog schema (`_cq_dialog`).
    Dialog,
    /// Component node definition (`.content.xml`).
    Config,
    /// Client-side script.
    Behavior,
    /// Typed data model (Sling model).
    Model,
    Style,
    Data,
    Other,
}

impl FileKind {
    /// Lower is analysed first.
    pub fn priority(self) -> u8 {
        match self {
            FileKind::Markup => 1,
            FileKind::Dialog | FileKind::Config => 2,
            FileKind::Behavior => 3,
            FileKind::Model => 4,
            FileKind::Style => 5,
            FileKind::Data => 6,
            FileKind::Other => 99,
        }
    }

    /// Kinds the analysis stage sends to the analyzer by default.
    pub fn is_primary(self) -> bool {
        matches!(
            self,
            FileKind::Markup | FileKind::Dialog | FileKind::Behavior | FileKind::Config
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Markup => "markup",
            FileKind::Dialog => "dialog",
            FileKind::Config => "config",
            FileKind::Behavior => "behavior",
            FileKind::Model => "model",
            FileKind::Style => "style",
            FileKind::Data => "data",
            FileKind::Other => "other",
        }
    }
}

/// Classify a file by its name and enclosing directories.
pub fn classify(path: &Path) -> FileKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let in_dialog = path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        part == "_cq_dialog" || part == "dialog" || part == "cq:dialog"
    });

    if in_dialog && (ext == "xml" || name == "dialog.xml") {
        return FileKind::Dialog;
    }
    if name == "dialog.xml" {
        return FileKind::Dialog;
    }
    if name == ".content.xml" {
        return FileKind::Config;
    }
    match ext.as_str() {
        "html" | "htl" => FileKind::Markup,
        "js" | "mjs" => FileKind::Behavior,
        "java" => FileKind::Model,
        "css" | "less" | "scss" => FileKind::Style,
        "json" => FileKind::Data,
        _ => FileKind::Other,
    }
}

/// Stable sort by kind priority, keeping discovery order within a kind.
pub fn prioritize(files: &[PathBuf]) -> Vec<(PathBuf, FileKind)> {
    let mut out: Vec<(PathBuf, FileKind)> =
        files.iter().map(|f| (f.clone(), classify(f))).collect();
    out.sort_by_key(|(_, kind)| kind.priority());
    out
}

/// Files the analysis stage should process: primary kinds in priority
/// order, or the first `fallback` prioritised files when none are primary.
pub fn select_for_analysis(files: &[PathBuf], fallback: usize) -> Vec<(PathBuf, FileKind)> {
    let ordered = prioritize(files);
    let primary: Vec<_> = ordered
        .iter()
        .filter(|(_, kind)| kind.is_primary())
        .cloned()
        .collect();
    if primary.is_empty() {
        ordered.into_iter().take(fallback).collect()
    } else {
        primary
    }
}

/// Analyzer output for one file. Failed analyses are kept as placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub kind: FileKind,
    pub content: serde_json::Value,
    pub error: Option<String>,
}

impl FileAnalysis {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind, content: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            kind,
            content,
            error: None,
        }
    }

    pub fn placeholder(
        path: impl Into<PathBuf>,
        kind: FileKind,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            path: path.into(),
            kind,
            content: serde_json::json!({ "analysis_failed": true, "reason": reason }),
            error: Some(reason),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}
