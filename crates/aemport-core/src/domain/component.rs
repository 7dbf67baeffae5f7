//! Component dependency tree.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One component in a resolved dependency tree.
///
/// Never contains itself, directly or transitively, in `dependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentNode {
    /// Logical identifier, e.g. `myproject/components/card`.
    pub id: String,
    pub path: PathBuf,
    /// Files in filesystem discovery order.
    pub files: Vec<PathBuf>,
    pub dependencies: BTreeMap<String, ComponentNode>,
}

impl ComponentNode {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            files,
            dependencies: BTreeMap::new(),
        }
    }

    /// Whether `id` appears anywhere below this node.
    pub fn contains_transitively(&self, id: &str) -> bool {
        self.dependencies
            .values()
            .any(|dep| dep.id == id || dep.contains_transitively(id))
    }

    /// Pre-order walk over this node and every descendant.
    pub fn walk(&self) -> Vec<&ComponentNode> {
        let mut out = vec![self];
        for dep in self.dependencies.values() {
            out.extend(dep.walk());
        }
        out
    }

    /// Every file of this node followed by its descendants' files.
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.walk()
            .into_iter()
            .flat_map(|node| node.files.iter().cloned())
            .collect()
    }

    /// Identifiers of every descendant, deduplicated, in walk order.
    pub fn dependency_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for node in self.walk().into_iter().skip(1) {
            if !ids.contains(&node.id) {
                ids.push(node.id.clone());
            }
        }
        ids
    }

    /// Target component name derived from the identifier.
    pub fn display_name(&self) -> String {
        display_name(&self.id)
    }
}

/// A reference that could not be turned into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub id: String,
    /// Component whose markup carried the reference.
    pub referenced_by: String,
    pub reason: String,
}

/// A reference skipped because it is already an ancestor on the current path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSkip {
    pub id: String,
    pub path: Vec<String>,
}

/// Output of dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyResolution {
    pub root: ComponentNode,
    pub unresolved: Vec<UnresolvedReference>,
    /// Components whose references were not followed because the depth budget ran out.
    pub truncated: Vec<String>,
    pub cycles: Vec<CycleSkip>,
}

impl DependencyResolution {
    pub fn unresolved_ids(&self) -> Vec<String> {
        self.unresolved.iter().map(|u| u.id.clone()).collect()
    }
}

/// PascalCase name from the last identifier segment: `foo/hero_banner` -> `HeroBanner`.
pub fn display_name(id: &str) -> String {
    let last = id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(id);
    last.split(|c: char| c == '_' || c == '-' || c == ' ' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ComponentNode {
        ComponentNode::new(id, format!("/repo/apps/{id}"), vec![])
    }

    #[test]
    fn test_display_name_pascal_case() {
        assert_eq!(display_name("site/components/hero_banner"), "HeroBanner");
        assert_eq!(display_name("site/components/text-image/"), "TextImage");
        assert_eq!(display_name("card"), "Card");
    }

    #[test]
    fn test_contains_transitively() {
        let mut root = node("a");
        let mut b = node("b");
        b.dependencies.insert("c".to_string(), node("c"));
        root.dependencies.insert("b".to_string(), b);

        assert!(root.contains_transitively("c"));
        assert!(root.contains_transitively("b"));
        assert!(!root.contains_transitively("a"));
    }

    #[test]
    fn test_dependency_ids_deduplicates_shared_nodes() {
        let mut root = node("page");
        let mut left = node("left");
        left.dependencies.insert("button".to_string(), node("button"));
        let mut right = node("right");
        right.dependencies.insert("button".to_string(), node("button"));
        root.dependencies.insert("left".to_string(), left);
        root.dependencies.insert("right".to_string(), right);

        assert_eq!(root.dependency_ids(), vec!["left", "button", "right"]);
    }

    #[test]
    fn test_all_files_root_first() {
        let mut root = ComponentNode::new("a", "/a", vec!["/a/a.html".into()]);
        root.dependencies.insert(
            "b".to_string(),
            ComponentNode::new("b", "/b", vec!["/b/b.html".into()]),
        );
        assert_eq!(
            root.all_files(),
            vec![PathBuf::from("/a/a.html"), PathBuf::from("/b/b.html")]
        );
    }
}
