//! Cascading style resolution.
//!
//! Classes are searched in priority order; a class stops being searched as
//! soon as one step finds it, while the remaining classes continue to the
//! next step:
//!
//! 1. component-local style files
//! 2. component-local bundle descriptors
//! 3. style paths and categories cited by the markup
//! 4. category-addressed bundles anywhere in the repository, following
//!    `embed` and `dependencies` through a visited set
//! 5. convention directories (themes, responsive, variables) above the component
//! 6. client-side scripts: injected style text, plus runtime class names
//!    which are fed back through steps 1-5
//! 7. repository-wide clientlib fallback for whatever is still missing

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::behavior::{dynamic_class_names, injected_style_blocks};
use super::bundle::{is_style_file, read_descriptor, BundleIndex};
use super::rules::rules_for_classes;
use crate::dependency::collect_files;
use crate::domain::{classify, FileKind, StyleResolution, StyleSource, StyleSummary};
use crate::locator::ResourceLocator;
use crate::markup::{extract_class_names, extract_style_references};

/// How many ancestor directories the convention step climbs.
const CONVENTION_LEVELS: usize = 5;
const CONVENTION_DIRS: &[&str] = &["themes", "theme", "responsive", "breakpoints", "variables"];
const STYLE_ROOTS: &[&str] = &["styles", "style", "css"];
const VARIABLE_FILES: &[&str] = &[
    "variables.css",
    "variables.less",
    "variables.scss",
    "_variables.scss",
];
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target"];

fn sorted_files(dir: &Path, max_depth: usize, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|skip| e.file_name() == *skip))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && keep(e.path()))
        .map(|e| e.into_path())
        .collect()
}

fn push_new(out: &mut Vec<PathBuf>, files: impl IntoIterator<Item = PathBuf>) {
    for file in files {
        if !out.contains(&file) {
            out.push(file);
        }
    }
}

/// Resolves which style rules define the classes a component uses.
///
/// The repository-wide bundle index is built on first use and reused by
/// every later resolution through the same resolver.
#[derive(Debug)]
pub struct StyleCascadeResolver {
    locator: ResourceLocator,
    index: OnceLock<BundleIndex>,
}

impl StyleCascadeResolver {
    pub fn new(locator: ResourceLocator) -> Self {
        Self {
            locator,
            index: OnceLock::new(),
        }
    }

    /// Use a pre-built bundle index instead of scanning the repository.
    pub fn with_index(locator: ResourceLocator, index: BundleIndex) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(index);
        Self {
            locator,
            index: cell,
        }
    }

    pub fn index_built(&self) -> bool {
        self.index.get().is_some()
    }

    fn index(&self) -> &BundleIndex {
        self.index
            .get_or_init(|| BundleIndex::scan(self.locator.repo_root()))
    }

    /// Style files in the component directory and its immediate subdirectories.
    pub fn local_style_files(&self, component_path: &Path) -> Vec<PathBuf> {
        sorted_files(component_path, 2, is_style_file)
    }

    /// Class names used by the component's markup files.
    pub fn used_classes(&self, component_path: &Path) -> BTreeSet<String> {
        let files = match collect_files(component_path) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    component = %component_path.display(),
                    error = %e,
                    "cannot list component files"
                );
                return BTreeSet::new();
            }
        };
        let mut classes = BTreeSet::new();
        for file in files.iter().filter(|f| classify(f) == FileKind::Markup) {
            if let Ok(text) = std::fs::read_to_string(file) {
                classes.extend(extract_class_names(&text));
            }
        }
        classes
    }

    /// Resolve rules for `used_classes`. Unfound classes end up in
    /// `missing_classes`; nothing here fails.
    pub fn resolve(
        &self,
        component_path: &Path,
        used_classes: &BTreeSet<String>,
    ) -> StyleResolution {
        let mut res = StyleResolution::default();
        let mut search = CascadeSearch::new(self, component_path);
        let mut pending = used_classes.clone();

        search.run_static_steps(&mut res, &mut pending);
        search.scan_behavior(&mut res, &mut pending, used_classes);

        if !pending.is_empty() {
            search.repository_fallback(&mut res, &mut pending);
        }

        debug!(
            component = %component_path.display(),
            found = res.found_by.len(),
            missing = pending.len(),
            categories = search.visited.len(),
            "style cascade resolved"
        );
        res.missing_classes = pending;
        res.visited_categories = search.visited;
        res
    }

    /// Resolve the component's own markup classes into generation hints.
    pub fn summarize(&self, component_path: &Path) -> StyleSummary {
        let used = self.used_classes(component_path);
        let resolution = self.resolve(component_path, &used);
        let local = self
            .local_style_files(component_path)
            .iter()
            .map(|f| self.locator.display_path(f))
            .collect();
        StyleSummary::from_resolution(used, &resolution, local)
    }
}

/// Per-resolution state: memoised file lists per step, the category
/// worklist and a read-once text cache.
struct CascadeSearch<'r> {
    resolver: &'r StyleCascadeResolver,
    component_path: PathBuf,
    local: Option<Vec<PathBuf>>,
    component_bundles: Option<Vec<PathBuf>>,
    markup_refs: Option<Vec<PathBuf>>,
    conventions: Option<Vec<PathBuf>>,
    category_files: Vec<PathBuf>,
    queue: VecDeque<String>,
    visited: BTreeSet<String>,
    seen_descriptors: BTreeSet<PathBuf>,
    searched: BTreeSet<PathBuf>,
    texts: BTreeMap<PathBuf, Rc<str>>,
}

impl<'r> CascadeSearch<'r> {
    fn new(resolver: &'r StyleCascadeResolver, component_path: &Path) -> Self {
        Self {
            resolver,
            component_path: component_path.to_path_buf(),
            local: None,
            component_bundles: None,
            markup_refs: None,
            conventions: None,
            category_files: Vec::new(),
            queue: VecDeque::new(),
            visited: BTreeSet::new(),
            seen_descriptors: BTreeSet::new(),
            searched: BTreeSet::new(),
            texts: BTreeMap::new(),
        }
    }

    fn label(&self, file: &Path) -> String {
        self.resolver.locator.display_path(file)
    }

    fn text(&mut self, file: &Path) -> Rc<str> {
        if let Some(text) = self.texts.get(file) {
            return Rc::clone(text);
        }
        let text: Rc<str> = match std::fs::read_to_string(file) {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unreadable style file");
                "".into()
            }
        };
        self.texts.insert(file.to_path_buf(), Rc::clone(&text));
        text
    }

    /// Search `files` for every class in `wanted`; returns the classes found.
    fn search(
        &mut self,
        res: &mut StyleResolution,
        wanted: &BTreeSet<String>,
        files: &[PathBuf],
        step: StyleSource,
    ) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if wanted.is_empty() {
            return found;
        }
        for file in files {
            self.searched.insert(file.clone());
            let text = self.text(file);
            let label = self.label(file);
            for (class_name, rule) in rules_for_classes(&text, wanted) {
                res.record(&class_name, &label, rule, step);
                found.insert(class_name);
            }
        }
        found
    }

    /// Steps 1 to 5 for whatever is in `pending`.
    fn run_static_steps(&mut self, res: &mut StyleResolution, pending: &mut BTreeSet<String>) {
        let steps = [
            StyleSource::ComponentLocal,
            StyleSource::ComponentBundle,
            StyleSource::MarkupReference,
            StyleSource::CategoryBundle,
            StyleSource::Convention,
        ];
        for step in steps {
            if pending.is_empty() {
                return;
            }
            let files = self.files_for(step);
            let found = self.search(res, pending, &files, step);
            pending.retain(|c| !found.contains(c));
        }
    }

    fn files_for(&mut self, step: StyleSource) -> Vec<PathBuf> {
        match step {
            StyleSource::ComponentLocal => self.local_files(),
            StyleSource::ComponentBundle => self.component_bundle_files(),
            StyleSource::MarkupReference => self.markup_reference_files(),
            StyleSource::CategoryBundle => {
                // categories are queued by the two steps above
                self.component_bundle_files();
                self.markup_reference_files();
                self.expand_categories();
                self.category_files.clone()
            }
            StyleSource::Convention => self.convention_files(),
            StyleSource::Behavior | StyleSource::RepositoryFallback => Vec::new(),
        }
    }

    fn local_files(&mut self) -> Vec<PathBuf> {
        if self.local.is_none() {
            self.local = Some(self.resolver.local_style_files(&self.component_path));
        }
        self.local.clone().unwrap_or_default()
    }

    fn enqueue<'a>(&mut self, categories: impl IntoIterator<Item = &'a String>) {
        for category in categories {
            if !self.visited.contains(category) && !self.queue.contains(category) {
                self.queue.push_back(category.clone());
            }
        }
    }

    fn component_bundle_files(&mut self) -> Vec<PathBuf> {
        if let Some(files) = &self.component_bundles {
            return files.clone();
        }
        let mut files = Vec::new();
        let descriptors = sorted_files(&self.component_path, 4, |p| {
            p.file_name().is_some_and(|n| n == ".content.xml")
        });
        for descriptor_path in descriptors {
            let Some(dir) = descriptor_path.parent() else {
                continue;
            };
            let Some(descriptor) = read_descriptor(dir) else {
                continue;
            };
            self.seen_descriptors.insert(descriptor.descriptor_path.clone());
            push_new(&mut files, descriptor.local_files.iter().cloned());
            self.enqueue(descriptor.categories.iter());
            self.enqueue(descriptor.referenced_categories());
        }
        self.component_bundles = Some(files.clone());
        files
    }

    fn markup_reference_files(&mut self) -> Vec<PathBuf> {
        if let Some(files) = &self.markup_refs {
            return files.clone();
        }
        let mut files = Vec::new();
        let markup = sorted_files(&self.component_path, usize::MAX, |p| {
            classify(p) == FileKind::Markup
        });
        let repo_root = self.resolver.locator.repo_root().to_path_buf();
        for markup_file in markup {
            let text = self.text(&markup_file);
            let refs = extract_style_references(&text);
            for cited in &refs.paths {
                let target = if cited.starts_with('/') {
                    repo_root.join(cited.trim_start_matches('/'))
                } else {
                    self.component_path.join(cited)
                };
                if target.is_dir() {
                    push_new(&mut files, sorted_files(&target, usize::MAX, is_style_file));
                } else if target.is_file() {
                    push_new(&mut files, [target]);
                } else {
                    debug!(
                        markup = %markup_file.display(),
                        path = %cited,
                        "cited style path not found"
                    );
                }
            }
            self.enqueue(refs.categories.iter());
        }
        self.markup_refs = Some(files.clone());
        files
    }

    /// Drain the category worklist. Each category is expanded at most once,
    /// so mutually embedding bundles terminate.
    fn expand_categories(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let resolver = self.resolver;
        let index = resolver.index();
        while let Some(category) = self.queue.pop_front() {
            if !self.visited.insert(category.clone()) {
                debug!(category = %category, "style category already visited");
                continue;
            }
            let bundles = index.lookup(&category);
            if bundles.is_empty() {
                debug!(category = %category, "no bundle declares category");
            }
            for bundle in bundles {
                if !self.seen_descriptors.insert(bundle.descriptor_path.clone()) {
                    continue;
                }
                push_new(&mut self.category_files, bundle.local_files.iter().cloned());
                for next in bundle.referenced_categories() {
                    if !self.visited.contains(next) && !self.queue.contains(next) {
                        self.queue.push_back(next.clone());
                    }
                }
            }
        }
    }

    fn convention_files(&mut self) -> Vec<PathBuf> {
        if let Some(files) = &self.conventions {
            return files.clone();
        }
        let repo_root = self.resolver.locator.repo_root().to_path_buf();
        let mut files = Vec::new();
        let mut current = self.component_path.parent();
        for _ in 0..CONVENTION_LEVELS {
            let Some(dir) = current else {
                break;
            };
            if !dir.starts_with(&repo_root) {
                break;
            }
            let mut bases = vec![dir.to_path_buf()];
            bases.extend(STYLE_ROOTS.iter().map(|root| dir.join(root)));
            for base in &bases {
                for name in CONVENTION_DIRS {
                    let candidate = base.join(name);
                    if candidate.is_dir() {
                        push_new(&mut files, sorted_files(&candidate, usize::MAX, is_style_file));
                    }
                }
                for name in VARIABLE_FILES {
                    let candidate = base.join(name);
                    if candidate.is_file() {
                        push_new(&mut files, [candidate]);
                    }
                }
            }
            if dir == repo_root {
                break;
            }
            current = dir.parent();
        }
        self.conventions = Some(files.clone());
        files
    }

    /// Step 6: injected style text is searched directly; runtime class
    /// names join the search set and go back through steps 1-5.
    fn scan_behavior(
        &mut self,
        res: &mut StyleResolution,
        pending: &mut BTreeSet<String>,
        used_classes: &BTreeSet<String>,
    ) {
        let scripts = sorted_files(&self.component_path, usize::MAX, |p| {
            classify(p) == FileKind::Behavior
        });
        if scripts.is_empty() {
            return;
        }

        let mut inline = Vec::new();
        for script in &scripts {
            let text = self.text(script);
            res.dynamic_classes.extend(dynamic_class_names(&text));
            for (n, block) in injected_style_blocks(&text).into_iter().enumerate() {
                let label = format!("{} (inline #{})", self.label(script), n + 1);
                res.inline_styles.insert(label.clone(), block.clone());
                inline.push((label, block));
            }
        }

        let fresh: BTreeSet<String> = res
            .dynamic_classes
            .iter()
            .filter(|c| !used_classes.contains(*c) && !res.is_found(c))
            .cloned()
            .collect();
        pending.extend(fresh.iter().cloned());

        for (label, block) in &inline {
            for (class_name, rule) in rules_for_classes(block, pending) {
                res.record(&class_name, label, rule, StyleSource::Behavior);
            }
        }
        pending.retain(|c| !res.is_found(c));

        let mut rerun: BTreeSet<String> = fresh.intersection(pending).cloned().collect();
        if !rerun.is_empty() {
            debug!(classes = rerun.len(), "re-resolving runtime class names");
            self.run_static_steps(res, &mut rerun);
            pending.retain(|c| !res.is_found(c));
        }
    }

    /// Step 7: style files under conventional clientlib directories that no
    /// earlier step looked at.
    fn repository_fallback(&mut self, res: &mut StyleResolution, pending: &mut BTreeSet<String>) {
        let repo_root = self.resolver.locator.repo_root().to_path_buf();
        let candidates: Vec<PathBuf> = sorted_files(&repo_root, usize::MAX, |p| {
            is_style_file(p)
                && p.strip_prefix(&repo_root).is_ok_and(|rel| {
                    rel.components().any(|c| {
                        c.as_os_str().to_string_lossy().starts_with("clientlib")
                    })
                })
        })
        .into_iter()
        .filter(|f| !self.searched.contains(f))
        .collect();

        let found = self.search(res, pending, &candidates, StyleSource::RepositoryFallback);
        pending.retain(|c| !found.contains(c));
    }
}
