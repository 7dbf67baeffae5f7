//! Design-library hints.
//!
//! A fixed table maps feature words found in a component's markup and
//! dialog (`button`, `tabs`, `textfield`, ...) to the design-library
//! components that usually implement them. When a library checkout is
//! configured, each hint also lists the library files defining those
//! components so the generator can import instead of re-implementing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{classify, FileKind};

/// Feature word to candidate library components, most specific first.
pub const MAPPING_RULES: &[(&str, &[&str])] = &[
    ("button", &["Button", "IconButton", "Fab"]),
    ("text", &["Typography", "Text"]),
    ("textfield", &["TextField", "Input"]),
    ("textarea", &["TextField", "Textarea"]),
    ("select", &["Select", "Autocomplete", "Dropdown"]),
    ("checkbox", &["Checkbox", "FormControlLabel"]),
    ("radio", &["Radio", "RadioGroup"]),
    ("image", &["CardMedia", "Avatar", "Image"]),
    ("list", &["List", "ListItem"]),
    ("card", &["Card", "CardContent", "CardMedia"]),
    ("dialog", &["Dialog", "Modal", "Drawer"]),
    ("tabs", &["Tabs", "Tab"]),
    ("accordion", &["Accordion", "AccordionSummary", "AccordionDetails"]),
    ("grid", &["Grid", "Grid2", "Box"]),
    ("container", &["Container", "Box"]),
    ("navigation", &["AppBar", "Drawer", "Menu"]),
    ("table", &["Table", "TableRow", "TableCell"]),
    ("form", &["FormControl", "FormGroup", "TextField", "Button"]),
    ("layout", &["Grid", "Container", "Box", "Stack"]),
    ("media", &["CardMedia", "Image", "Avatar"]),
];

/// Source extensions indexed in a library checkout.
const LIBRARY_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// Library components suggested for one feature of the source component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignHint {
    pub feature: String,
    pub components: Vec<String>,
    /// Library files defining any of `components`, empty without a library.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<PathBuf>,
}

/// Feature words named in `text`, in table order. A word matches a rule
/// when it equals the rule's feature or its plural.
pub fn match_features(text: &str) -> Vec<&'static str> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    MAPPING_RULES
        .iter()
        .map(|(feature, _)| *feature)
        .filter(|feature| {
            words
                .iter()
                .any(|w| w == feature || w.strip_suffix('s') == Some(feature))
        })
        .collect()
}

/// Suggests design-library components for a component's files.
#[derive(Debug, Clone, Default)]
pub struct DesignLibrary {
    root: Option<PathBuf>,
    /// Lowercased component name to defining files.
    index: BTreeMap<String, Vec<PathBuf>>,
}

impl DesignLibrary {
    /// Hints without file locations.
    pub fn unindexed() -> Self {
        Self::default()
    }

    /// Index the library checkout at `root`.
    pub fn scan(root: &Path) -> Self {
        let mut index: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && SKIPPED_DIRS
                        .iter()
                        .any(|skip| e.file_name().to_string_lossy() == *skip))
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable library entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = component_name(entry.path()) {
                index
                    .entry(name.to_ascii_lowercase())
                    .or_default()
                    .push(entry.into_path());
            }
        }
        debug!(components = index.len(), library = %root.display(), "design library indexed");
        Self {
            root: Some(root.to_path_buf()),
            index,
        }
    }

    /// `scan` when a library is configured, `unindexed` otherwise.
    pub fn from_config(root: Option<&Path>) -> Self {
        root.map(Self::scan).unwrap_or_default()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Files defining `component`, case-insensitively.
    pub fn locate(&self, component: &str) -> &[PathBuf] {
        self.index
            .get(&component.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Hints for a component from its id plus markup and dialog sources.
    /// Unreadable files are skipped.
    pub fn hints_for(&self, component_id: &str, files: &[PathBuf]) -> Vec<DesignHint> {
        let mut text = component_id.to_string();
        for file in files {
            if !matches!(classify(file), FileKind::Markup | FileKind::Dialog) {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(file) {
                text.push('\n');
                text.push_str(&content);
            }
        }
        self.hints_for_text(&text)
    }

    pub fn hints_for_text(&self, text: &str) -> Vec<DesignHint> {
        match_features(text)
            .into_iter()
            .filter_map(|feature| {
                let (_, components) = MAPPING_RULES.iter().find(|(f, _)| *f == feature)?;
                let mut locations: Vec<PathBuf> = Vec::new();
                for component in components.iter() {
                    for path in self.locate(component) {
                        if !locations.contains(path) {
                            locations.push(path.clone());
                        }
                    }
                }
                Some(DesignHint {
                    feature: feature.to_string(),
                    components: components.iter().map(|c| c.to_string()).collect(),
                    locations,
                })
            })
            .collect()
    }
}

/// Component a library file defines: its stem, or the directory name for
/// `Button/index.tsx`. Test and story files define nothing.
fn component_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !LIBRARY_EXTENSIONS.contains(&ext) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.contains('.') {
        return None;
    }
    let name = if stem == "index" {
        path.parent()?.file_name()?.to_str()?
    } else {
        stem
    };
    name.starts_with(|c: char| c.is_ascii_uppercase())
        .then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_match_whole_words_and_plurals() {
        let text = r#"<div class="cmp-hero__buttons"><img class="cmp-hero__image"/></div>
            sling:resourceType="granite/ui/components/coral/foundation/form/textfield""#;
        assert_eq!(
            match_features(text),
            vec!["button", "textfield", "image", "form"]
        );
        // substrings do not count
        assert!(match_features("context playlist formatted").is_empty());
    }

    #[test]
    fn test_hints_without_library_have_no_locations() {
        let hints = DesignLibrary::unindexed().hints_for_text("site/components/tabs");
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].feature, "tabs");
        assert_eq!(hints[0].components, vec!["Tabs", "Tab"]);
        assert!(hints[0].locations.is_empty());
    }

    #[test]
    fn test_scan_indexes_components_by_stem_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path();
        std::fs::create_dir_all(lib.join("src/Button")).unwrap();
        std::fs::create_dir_all(lib.join("node_modules/x")).unwrap();
        std::fs::write(lib.join("src/Button/index.tsx"), "export {}").unwrap();
        std::fs::write(lib.join("src/IconButton.jsx"), "export {}").unwrap();
        std::fs::write(lib.join("src/Button.test.tsx"), "test").unwrap();
        std::fs::write(lib.join("src/helpers.ts"), "").unwrap();
        std::fs::write(lib.join("node_modules/x/Fab.js"), "").unwrap();

        let library = DesignLibrary::scan(lib);
        assert_eq!(library.locate("button"), [lib.join("src/Button/index.tsx")]);
        assert!(library.locate("Fab").is_empty());
        assert!(library.locate("helpers").is_empty());

        let hints = library.hints_for_text("button");
        assert_eq!(
            hints[0].locations,
            vec![lib.join("src/Button/index.tsx"), lib.join("src/IconButton.jsx")]
        );
    }

    #[test]
    fn test_hints_read_markup_and_dialog_only() {
        let dir = tempfile::tempdir().unwrap();
        let comp = dir.path().join("teaser");
        std::fs::create_dir_all(comp.join("_cq_dialog")).unwrap();
        std::fs::write(
            comp.join("teaser.html"),
            "<section class=\"accordion\"></section>",
        )
        .unwrap();
        std::fs::write(comp.join("_cq_dialog/.content.xml"), "<checkbox/>").unwrap();
        std::fs::write(comp.join("teaser.js"), "// table").unwrap();
        let files = vec![
            comp.join("teaser.html"),
            comp.join("_cq_dialog/.content.xml"),
            comp.join("teaser.js"),
        ];

        let features: Vec<String> = DesignLibrary::unindexed()
            .hints_for("site/teaser", &files)
            .into_iter()
            .map(|h| h.feature)
            .collect();
        assert_eq!(features, vec!["checkbox", "accordion"]);
    }
}
