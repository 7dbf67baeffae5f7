//! Interfaces to the external collaborators: file analysis, code
//! generation, repair and review.
//!
//! Collaborators answer with a tagged [`CollaboratorOutput`] instead of
//! errors alone, because a text model may return a structured answer,
//! free text, or nothing usable. The orchestrator matches on it explicitly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::design::DesignHint;
use crate::domain::{
    CollaboratorError, FileAnalysis, FileKind, ReviewFinding, StyleSummary,
};
use crate::registry::RegistryEntry;

/// Tagged collaborator answer.
#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorOutput<T> {
    Structured(T),
    /// Unstructured text that needs best-effort extraction.
    Raw(String),
    Failed(CollaboratorError),
}

impl<T> CollaboratorOutput<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, CollaboratorOutput::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CollaboratorOutput<U> {
        match self {
            CollaboratorOutput::Structured(v) => CollaboratorOutput::Structured(f(v)),
            CollaboratorOutput::Raw(text) => CollaboratorOutput::Raw(text),
            CollaboratorOutput::Failed(e) => CollaboratorOutput::Failed(e),
        }
    }
}

impl<T> From<std::result::Result<T, CollaboratorError>> for CollaboratorOutput<T> {
    fn from(result: std::result::Result<T, CollaboratorError>) -> Self {
        match result {
            Ok(v) => CollaboratorOutput::Structured(v),
            Err(e) => CollaboratorOutput::Failed(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One source file to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub component_id: String,
    pub path: PathBuf,
    pub kind: FileKind,
    pub content: String,
}

/// Everything the generator gets to produce one target component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub component_id: String,
    pub display_name: String,
    pub analyses: Vec<FileAnalysis>,
    /// Analyses of dependency components, keyed by dependency id.
    pub dependency_analyses: BTreeMap<String, Vec<FileAnalysis>>,
    pub styles: StyleSummary,
    /// Dependencies that already have generated artifacts to import.
    pub existing_dependencies: Vec<RegistryEntry>,
    pub unresolved_dependencies: Vec<String>,
    /// Design-library components suggested by the source's features.
    #[serde(default)]
    pub design_hints: Vec<DesignHint>,
}

impl GenerationRequest {
    fn of_kinds<'a>(&'a self, kinds: &'a [FileKind]) -> impl Iterator<Item = &'a FileAnalysis> {
        self.analyses
            .iter()
            .filter(move |a| kinds.contains(&a.kind) && !a.is_placeholder())
    }

    /// Dialog and model analyses: the target data shape (props).
    pub fn data_shape(&self) -> Vec<&FileAnalysis> {
        self.of_kinds(&[FileKind::Dialog, FileKind::Model, FileKind::Config])
            .collect()
    }

    /// Markup analyses: the UI structure.
    pub fn ui_structure(&self) -> Vec<&FileAnalysis> {
        self.of_kinds(&[FileKind::Markup]).collect()
    }

    pub fn behavior(&self) -> Vec<&FileAnalysis> {
        self.of_kinds(&[FileKind::Behavior]).collect()
    }
}

/// Current candidate plus the findings it must address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub component_id: String,
    pub display_name: String,
    pub artifact: GeneratedArtifact,
    pub failing_findings: Vec<ReviewFinding>,
    pub iteration: u32,
}

/// Candidate handed to each validator. The artifact is already on disk at
/// `artifact_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub component_id: String,
    pub display_name: String,
    pub artifact_path: PathBuf,
    pub source: String,
    pub style_source: Option<String>,
    pub iteration: u32,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Text items from a string, a list, or null. Non-string list items are
/// kept as their JSON text.
fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_list(&Value::deserialize(deserializer)?))
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Typed manifest accompanying generated source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default, deserialize_with = "string_or_list")]
    pub imports: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entry_symbol: String,
}

/// Generated target component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub source: String,
    #[serde(default)]
    pub style_source: Option<String>,
    #[serde(default)]
    pub manifest: ArtifactManifest,
    #[serde(default, deserialize_with = "string_or_list")]
    pub notes: Vec<String>,
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static IMPORT_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"from\s+['"]([^'"]+)['"]"#).expect("valid regex"));

static DEFAULT_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+default\s+(?:function\s+|class\s+)?([A-Z][A-Za-z0-9_]*)")
        .expect("valid regex")
});

/// Largest fenced code block in `raw`, or the trimmed text when unfenced.
pub fn extract_code_block(raw: &str) -> String {
    FENCE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .max_by_key(|block| block.len())
        .unwrap_or(raw)
        .trim()
        .to_string()
}

/// Manifest recovered from source text.
pub fn infer_manifest(source: &str, display_name: &str) -> ArtifactManifest {
    let imports: Vec<String> = source
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("import "))
        .map(str::to_string)
        .collect();
    let mut dependencies: Vec<String> = Vec::new();
    for caps in IMPORT_FROM.captures_iter(source) {
        let module = caps[1].to_string();
        if !module.starts_with('.') && !dependencies.contains(&module) {
            dependencies.push(module);
        }
    }
    let entry_symbol = DEFAULT_EXPORT
        .captures(source)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| display_name.to_string());
    ArtifactManifest {
        imports,
        dependencies,
        entry_symbol,
    }
}

impl GeneratedArtifact {
    /// Artifact from a loosely typed JSON object. Reads `source` (or `code`)
    /// and `style_source` (or `css`); other fields are taken when they fit.
    /// `None` when the object carries no source text.
    pub fn from_json_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        let source = text(&["source", "code"])?;
        Some(Self {
            source,
            style_source: text(&["style_source", "css"]),
            manifest: object
                .get("manifest")
                .and_then(|m| serde_json::from_value(m.clone()).ok())
                .unwrap_or_default(),
            notes: object.get("notes").map(text_list).unwrap_or_default(),
        })
    }

    /// Best-effort artifact from free text; `None` when nothing usable remains.
    /// A JSON document is read field by field and never used as source text.
    pub fn from_raw(raw: &str, display_name: &str) -> Option<Self> {
        let source = extract_code_block(raw);
        if source.is_empty() {
            return None;
        }
        if source.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(&source) {
                let mut artifact = Self::from_json_value(&value)?;
                if artifact.manifest.entry_symbol.is_empty() {
                    artifact.manifest = infer_manifest(&artifact.source, display_name);
                }
                return Some(artifact);
            }
        }
        let manifest = infer_manifest(&source, display_name);
        Some(Self {
            source,
            style_source: None,
            manifest,
            notes: vec!["extracted from unstructured response".to_string()],
        })
    }

    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Turns one source file into a structured description.
#[async_trait]
pub trait FileAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> CollaboratorOutput<serde_json::Value>;
}

/// Produces a target component from analysed inputs.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> CollaboratorOutput<GeneratedArtifact>;
}

/// Produces a revised candidate that addresses failing findings.
#[async_trait]
pub trait CodeRepairer: Send + Sync {
    async fn repair(&self, request: &RepairRequest) -> CollaboratorOutput<GeneratedArtifact>;
}

/// One independent review check.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Check name; unique within a review run.
    fn name(&self) -> &str;

    async fn review(&self, request: &ReviewRequest) -> CollaboratorOutput<ReviewFinding>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_largest_fence() {
        let raw = "Here:\n```css\n.a{}\n```\nand\n```jsx\nimport React from 'react';\nexport default function Card() { return <div/>; }\n```\n";
        let code = extract_code_block(raw);
        assert!(code.starts_with("import React"));
        assert!(code.ends_with("}"));
    }

    #[test]
    fn test_extract_unfenced_text() {
        assert_eq!(extract_code_block("  const x = 1;  "), "const x = 1;");
    }

    #[test]
    fn test_infer_manifest() {
        let src = "import React from 'react';\nimport Title from './Title';\nimport cx from \"classnames\";\nexport default function HeroBanner() {}";
        let m = infer_manifest(src, "Fallback");
        assert_eq!(m.imports.len(), 3);
        assert_eq!(m.dependencies, vec!["react", "classnames"]);
        assert_eq!(m.entry_symbol, "HeroBanner");
    }

    #[test]
    fn test_from_raw_empty_is_none() {
        assert!(GeneratedArtifact::from_raw("```\n\n```", "Card").is_none());
        let art = GeneratedArtifact::from_raw("const Card = () => null;", "Card").unwrap();
        assert_eq!(art.manifest.entry_symbol, "Card");
    }

    #[test]
    fn test_loosely_typed_fields_deserialize() {
        let artifact: GeneratedArtifact = serde_json::from_str(
            r#"{"source": "export default function A() {}", "notes": "converted",
                "manifest": {"imports": "import React from 'react';", "entry_symbol": null}}"#,
        )
        .unwrap();
        assert_eq!(artifact.notes, vec!["converted"]);
        assert_eq!(artifact.manifest.imports.len(), 1);
        assert!(artifact.manifest.entry_symbol.is_empty());
    }

    #[test]
    fn test_from_raw_lifts_source_out_of_json() {
        let raw = r#"```json
{"source": "export default function Card() {\n  return null;\n}\n", "css": ".card {}", "notes": 3}
```"#;
        let art = GeneratedArtifact::from_raw(raw, "Card").unwrap();
        assert!(art.source.starts_with("export default function Card() {\n"));
        assert_eq!(art.style_source.as_deref(), Some(".card {}"));
        assert_eq!(art.notes, vec!["3"]);
        assert_eq!(art.manifest.entry_symbol, "Card");

        assert!(GeneratedArtifact::from_raw(r#"{"notes": ["no code"]}"#, "Card").is_none());
    }

    #[test]
    fn test_output_from_result() {
        let out: CollaboratorOutput<u8> = Err(CollaboratorError::Timeout("x".into())).into();
        assert!(out.is_failed());
        let out: CollaboratorOutput<u8> = Ok(3).into();
        assert_eq!(out.map(|v| v * 2), CollaboratorOutput::Structured(6));
    }
}
