//! Client library (style bundle) descriptors and the repository-wide
//! category index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::StyleBundleDescriptor;

static XML_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#).expect("valid regex"));

const DESCRIPTOR_FILE: &str = ".content.xml";
const CSS_MANIFEST: &str = "css.txt";
const BUNDLE_PRIMARY_TYPE: &str = "cq:ClientLibraryFolder";
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target"];

pub fn is_style_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("css" | "less" | "scss")
    )
}

fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

/// JCR multi-value attribute: `[a,b]`, `a,b` or `{String}[a]`.
fn parse_list(value: &str) -> BTreeSet<String> {
    let value = value.trim();
    let value = match value.strip_prefix('{') {
        Some(rest) => rest.split_once('}').map(|(_, v)| v).unwrap_or(rest),
        None => value,
    };
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse descriptor text. `None` when the node is not a style bundle.
pub fn parse_descriptor_text(descriptor_path: &Path, text: &str) -> Option<StyleBundleDescriptor> {
    let attrs: BTreeMap<&str, &str> = XML_ATTR
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((name, value))
        })
        .collect();

    let is_bundle = attrs.get("jcr:primaryType") == Some(&BUNDLE_PRIMARY_TYPE)
        || attrs.contains_key("categories");
    if !is_bundle {
        return None;
    }

    let dir = descriptor_path.parent().unwrap_or(descriptor_path);
    Some(StyleBundleDescriptor {
        descriptor_path: descriptor_path.to_path_buf(),
        categories: attrs.get("categories").map(|v| parse_list(v)).unwrap_or_default(),
        embeds: attrs.get("embed").map(|v| parse_list(v)).unwrap_or_default(),
        depends_on: attrs.get("dependencies").map(|v| parse_list(v)).unwrap_or_default(),
        local_files: local_style_files(dir),
    })
}

/// Read and parse `<dir>/.content.xml`.
pub fn read_descriptor(dir: &Path) -> Option<StyleBundleDescriptor> {
    let path = dir.join(DESCRIPTOR_FILE);
    let text = std::fs::read_to_string(&path).ok()?;
    parse_descriptor_text(&path, &text)
}

fn declares_bundle(dir: &Path) -> bool {
    std::fs::read_to_string(dir.join(DESCRIPTOR_FILE))
        .map(|text| text.contains(BUNDLE_PRIMARY_TYPE) || text.contains("categories="))
        .unwrap_or(false)
}

/// Style files owned by a bundle directory: the `css.txt` manifest order if
/// present, else every style file below it that is not inside a nested bundle.
pub fn local_style_files(dir: &Path) -> Vec<PathBuf> {
    if let Ok(manifest) = std::fs::read_to_string(dir.join(CSS_MANIFEST)) {
        return files_from_manifest(dir, &manifest);
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() || e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !is_skipped_dir(&name) && !declares_bundle(e.path())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_style_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// Entries of an AEM `css.txt` manifest, honouring `#base=` lines.
pub fn files_from_manifest(dir: &Path, manifest: &str) -> Vec<PathBuf> {
    let mut base = dir.to_path_buf();
    let mut out = Vec::new();
    for line in manifest.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#base=") {
            base = dir.join(rest.trim());
            continue;
        }
        if line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let path = base.join(line);
        if path.is_file() {
            out.push(path);
        } else {
            debug!(manifest = %dir.display(), entry = %line, "manifest entry missing on disk");
        }
    }
    out
}

/// Every style bundle in a repository, addressable by category.
#[derive(Debug, Clone, Default)]
pub struct BundleIndex {
    by_category: BTreeMap<String, Vec<StyleBundleDescriptor>>,
    bundle_count: usize,
}

impl BundleIndex {
    /// Walk the whole repository. Unreadable entries are logged and skipped.
    pub fn scan(repo_root: &Path) -> Self {
        let mut index = Self::default();
        let walker = WalkDir::new(repo_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir() && is_skipped_dir(&e.file_name().to_string_lossy()))
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable repository entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != DESCRIPTOR_FILE {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            if let Some(descriptor) = parse_descriptor_text(entry.path(), &text) {
                index.insert(descriptor);
            }
        }
        debug!(
            bundles = index.bundle_count,
            categories = index.by_category.len(),
            "style bundle index built"
        );
        index
    }

    pub fn insert(&mut self, descriptor: StyleBundleDescriptor) {
        self.bundle_count += 1;
        for category in &descriptor.categories {
            self.by_category
                .entry(category.clone())
                .or_default()
                .push(descriptor.clone());
        }
    }

    /// Bundles declaring `category`, independent of where they live.
    pub fn lookup(&self, category: &str) -> &[StyleBundleDescriptor] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn bundle_count(&self) -> usize {
        self.bundle_count
    }

    pub fn category_count(&self) -> usize {
        self.by_category.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_list_forms() {
        let expected: BTreeSet<String> = ["a.b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_list("[a.b, c]"), expected);
        assert_eq!(parse_list("a.b,c"), expected);
        assert_eq!(parse_list("{String}[a.b,c]"), expected);
        assert!(parse_list("[]").is_empty());
    }

    #[test]
    fn test_non_bundle_node_is_ignored() {
        let text = r#"<jcr:root jcr:primaryType="cq:Component" jcr:title="Card"/>"#;
        assert!(parse_descriptor_text(Path::new("/x/.content.xml"), text).is_none());
    }

    #[test]
    fn test_descriptor_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let text = r#"<jcr:root xmlns:cq="http://www.day.com/jcr/cq/1.0"
    jcr:primaryType="cq:ClientLibraryFolder"
    categories="[site.card]"
    embed="[site.base,site.grid]"
    dependencies="[site.vendor]"/>"#;
        let d = parse_descriptor_text(&dir.path().join(".content.xml"), text).unwrap();
        assert!(d.categories.contains("site.card"));
        assert_eq!(d.embeds.len(), 2);
        assert!(d.depends_on.contains("site.vendor"));
    }

    #[test]
    fn test_manifest_base_and_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/b.css"), ".b{}").unwrap();
        fs::write(dir.path().join("css/a.css"), ".a{}").unwrap();
        fs::write(dir.path().join("css.txt"), "#base=css\nb.css\n# note\na.css\nmissing.css\n")
            .unwrap();

        let files = local_style_files(dir.path());
        assert_eq!(
            files,
            vec![dir.path().join("css/b.css"), dir.path().join("css/a.css")]
        );
    }

    #[test]
    fn test_walk_skips_nested_bundles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("own.css"), "").unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(".content.xml"), r#"<jcr:root categories="[x]"/>"#).unwrap();
        fs::write(nested.join("other.css"), "").unwrap();

        assert_eq!(local_style_files(dir.path()), vec![dir.path().join("own.css")]);
    }

    #[test]
    fn test_index_matches_category_not_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("apps/site/clientlibs/whatever-name");
        fs::create_dir_all(&lib).unwrap();
        fs::write(
            lib.join(".content.xml"),
            r#"<jcr:root jcr:primaryType="cq:ClientLibraryFolder" categories="[site.theme]"/>"#,
        )
        .unwrap();
        fs::write(lib.join("theme.css"), ".x{}").unwrap();

        let index = BundleIndex::scan(dir.path());
        assert_eq!(index.lookup("site.theme").len(), 1);
        assert!(index.lookup("whatever-name").is_empty());
        assert_eq!(index.bundle_count(), 1);
    }
}
