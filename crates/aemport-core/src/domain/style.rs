//! Style cascade data: rules, bundle descriptors and resolution results.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One rule block that defines (or references) a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub class_name: String,
    pub source_file: String,
    pub rule_text: String,
}

/// A category-addressed style bundle declaration (`cq:ClientLibraryFolder`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleBundleDescriptor {
    pub descriptor_path: PathBuf,
    pub categories: BTreeSet<String>,
    pub embeds: BTreeSet<String>,
    pub depends_on: BTreeSet<String>,
    pub local_files: Vec<PathBuf>,
}

impl StyleBundleDescriptor {
    /// Categories this bundle pulls in, embeds first.
    pub fn referenced_categories(&self) -> impl Iterator<Item = &String> {
        self.embeds.iter().chain(self.depends_on.iter())
    }
}

/// Which search step located a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleSource {
    ComponentLocal,
    ComponentBundle,
    MarkupReference,
    CategoryBundle,
    Convention,
    Behavior,
    RepositoryFallback,
}

/// Result of cascading style resolution for one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleResolution {
    /// class -> source label -> rule text. Deduplicated by `(class, source)`.
    pub rules: BTreeMap<String, BTreeMap<String, String>>,
    pub missing_classes: BTreeSet<String>,
    pub found_by: BTreeMap<String, StyleSource>,
    /// Classes discovered in client-side scripts and folded into the search.
    pub dynamic_classes: BTreeSet<String>,
    /// Style text injected by scripts, keyed by script label.
    pub inline_styles: BTreeMap<String, String>,
    pub visited_categories: BTreeSet<String>,
}

impl StyleResolution {
    /// Record a rule; returns `false` when `(class, source)` was already present.
    pub fn record(
        &mut self,
        class_name: &str,
        source: &str,
        rule_text: String,
        step: StyleSource,
    ) -> bool {
        let sources = self.rules.entry(class_name.to_string()).or_default();
        if sources.contains_key(source) {
            return false;
        }
        sources.insert(source.to_string(), rule_text);
        self.found_by.entry(class_name.to_string()).or_insert(step);
        true
    }

    pub fn is_found(&self, class_name: &str) -> bool {
        self.rules
            .get(class_name)
            .is_some_and(|sources| !sources.is_empty())
    }

    pub fn flat_rules(&self) -> Vec<StyleRule> {
        self.rules
            .iter()
            .flat_map(|(class_name, sources)| {
                sources.iter().map(move |(source, text)| StyleRule {
                    class_name: class_name.clone(),
                    source_file: source.clone(),
                    rule_text: text.clone(),
                })
            })
            .collect()
    }
}

/// Style hints handed to the generation collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSummary {
    pub used_classes: BTreeSet<String>,
    pub found_classes: BTreeSet<String>,
    pub missing_classes: BTreeSet<String>,
    pub rules: BTreeMap<String, BTreeMap<String, String>>,
    pub component_style_files: Vec<String>,
    pub inline_styles: BTreeMap<String, String>,
}

impl StyleSummary {
    pub fn from_resolution(
        used_classes: BTreeSet<String>,
        resolution: &StyleResolution,
        component_style_files: Vec<String>,
    ) -> Self {
        let found_classes: BTreeSet<String> = resolution
            .rules
            .iter()
            .filter(|(_, sources)| !sources.is_empty())
            .map(|(class, _)| class.clone())
            .collect();
        let mut used = used_classes;
        used.extend(resolution.dynamic_classes.iter().cloned());
        Self {
            missing_classes: used.difference(&found_classes).cloned().collect(),
            used_classes: used,
            found_classes,
            rules: resolution.rules.clone(),
            component_style_files,
            inline_styles: resolution.inline_styles.clone(),
        }
    }

    /// Fold a dependency's summary in, labelling its sources `[dep_id] source`.
    pub fn merge_dependency(&mut self, dep_id: &str, dep: &StyleSummary) {
        for (class, sources) in &dep.rules {
            let entry = self.rules.entry(class.clone()).or_default();
            for (source, text) in sources {
                entry
                    .entry(format!("[{dep_id}] {source}"))
                    .or_insert_with(|| text.clone());
            }
        }
        for (source, text) in &dep.inline_styles {
            self.inline_styles
                .entry(format!("[{dep_id}] {source}"))
                .or_insert_with(|| text.clone());
        }
        self.used_classes.extend(dep.used_classes.iter().cloned());
        self.found_classes.extend(dep.found_classes.iter().cloned());
        self.missing_classes = self
            .used_classes
            .difference(&self.found_classes)
            .cloned()
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.used_classes.is_empty() && self.rules.is_empty() && self.inline_styles.is_empty()
    }
}
