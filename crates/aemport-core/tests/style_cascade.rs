use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use aemport_core::{ResourceLocator, StyleCascadeResolver, StyleSource};
use tempfile::{tempdir, TempDir};

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

fn bundle(root: &Path, dir: &str, category: &str, embed: &str) {
    write(
        root,
        &format!("{dir}/.content.xml"),
        &format!(
            r#"<jcr:root jcr:primaryType="cq:ClientLibraryFolder" categories="[{category}]" embed="[{embed}]"/>"#
        ),
    );
}

/// A card component using `classes`, with `.card` defined locally.
fn card_repo(classes: &str, extra_markup: &str) -> (TempDir, PathBuf) {
    let repo = tempdir().unwrap();
    write(
        repo.path(),
        "apps/site/components/card/card.html",
        &format!("<div class=\"{classes}\">{extra_markup}</div>\n"),
    );
    write(
        repo.path(),
        "apps/site/components/card/card.css",
        ".card { display: flex; }\n",
    );
    let path = repo.path().join("apps/site/components/card");
    (repo, path)
}

fn resolver(repo: &TempDir) -> StyleCascadeResolver {
    StyleCascadeResolver::new(ResourceLocator::new(repo.path()))
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn local_rules_resolve_without_building_the_category_index() {
    let (repo, card) = card_repo("card", "");
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card"]));

    assert_eq!(resolution.found_by["card"], StyleSource::ComponentLocal);
    assert!(resolution.missing_classes.is_empty());
    assert!(!styles.index_built());
}

#[test]
fn mutually_embedding_bundles_terminate() {
    let call = r#"<sly data-sly-call="${clientlib.css @ categories=['site.card']}"/>"#;
    let (repo, card) = card_repo("card card__title", call);
    bundle(repo.path(), "apps/site/clientlibs/clientlib-card", "site.card", "site.base");
    write(
        repo.path(),
        "apps/site/clientlibs/clientlib-card/card-bundle.css",
        ".unrelated { color: red; }\n",
    );
    bundle(repo.path(), "apps/site/clientlibs/clientlib-base", "site.base", "site.card");
    write(
        repo.path(),
        "apps/site/clientlibs/clientlib-base/base.css",
        ".card__title { font-weight: 700; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "card__title"]));

    assert_eq!(resolution.found_by["card__title"], StyleSource::CategoryBundle);
    assert!(resolution.rules["card__title"]
        .contains_key("apps/site/clientlibs/clientlib-base/base.css"));
    assert_eq!(resolution.visited_categories, set(&["site.base", "site.card"]));
    assert!(resolution.missing_classes.is_empty());
    assert!(styles.index_built());
}

#[test]
fn component_bundle_embeds_feed_the_category_step() {
    let (repo, card) = card_repo("card card__media card__badge", "");
    bundle(
        repo.path(),
        "apps/site/components/card/clientlibs/site",
        "site.card",
        "site.shared",
    );
    write(
        repo.path(),
        "apps/site/components/card/clientlibs/site/css/media.css",
        ".card__media { width: 100%; }\n",
    );
    bundle(repo.path(), "apps/site/clientlibs/clientlib-shared", "site.shared", "");
    write(
        repo.path(),
        "apps/site/clientlibs/clientlib-shared/shared.css",
        ".card__badge { color: gold; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "card__media", "card__badge"]));

    assert_eq!(resolution.found_by["card"], StyleSource::ComponentLocal);
    assert_eq!(resolution.found_by["card__media"], StyleSource::ComponentBundle);
    assert!(resolution.rules["card__media"]
        .contains_key("apps/site/components/card/clientlibs/site/css/media.css"));
    assert_eq!(resolution.found_by["card__badge"], StyleSource::CategoryBundle);
    assert!(resolution.rules["card__badge"]
        .contains_key("apps/site/clientlibs/clientlib-shared/shared.css"));
    assert_eq!(resolution.visited_categories, set(&["site.card", "site.shared"]));
    assert!(resolution.missing_classes.is_empty());
}

#[test]
fn style_path_cited_by_markup_is_searched() {
    let call = r#"<sly data-sly-call="${template.styles @ path='/apps/site/styles/card-extra.css'}"/>"#;
    let (repo, card) = card_repo("card card--wide", call);
    write(
        repo.path(),
        "apps/site/styles/card-extra.css",
        ".card--wide { max-width: none; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "card--wide"]));

    assert_eq!(resolution.found_by["card--wide"], StyleSource::MarkupReference);
    assert!(resolution.rules["card--wide"].contains_key("apps/site/styles/card-extra.css"));
    assert!(resolution.visited_categories.is_empty());
    assert!(!styles.index_built());
}

#[test]
fn earlier_step_owns_a_class_defined_in_several_places() {
    let call = r#"<sly data-sly-call="${clientlib.css @ categories='site.card'}"/>"#;
    let (repo, card) = card_repo("card card__title", call);
    bundle(repo.path(), "apps/site/clientlibs/clientlib-card", "site.card", "");
    write(
        repo.path(),
        "apps/site/clientlibs/clientlib-card/card.css",
        ".card { display: grid; }\n.card__title { font-weight: 700; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "card__title"]));

    assert_eq!(resolution.found_by["card"], StyleSource::ComponentLocal);
    let card_sources: Vec<&String> = resolution.rules["card"].keys().collect();
    assert_eq!(card_sources, vec!["apps/site/components/card/card.css"]);
    assert_eq!(resolution.found_by["card__title"], StyleSource::CategoryBundle);
    assert!(styles.index_built());
}

#[test]
fn runtime_classes_from_scripts_are_resolved() {
    let (repo, card) = card_repo("card", "");
    write(
        repo.path(),
        "apps/site/components/card/card.css",
        ".card { display: flex; }\n.card.is-open { display: block; }\n",
    );
    write(
        repo.path(),
        "apps/site/components/card/card.js",
        "el.classList.add('is-open');\n",
    );
    let styles = resolver(&repo);

    let summary = styles.summarize(&card);

    assert!(summary.used_classes.contains("is-open"));
    assert!(summary.found_classes.contains("is-open"));
    assert!(summary.missing_classes.is_empty());
}

#[test]
fn injected_style_text_counts_as_a_source() {
    let (repo, card) = card_repo("card", "");
    write(
        repo.path(),
        "apps/site/components/card/card.js",
        "sheet.insertRule('.card__spinner { display: none; }', 0);\nel.classList.add('card__spinner');\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card"]));

    assert_eq!(resolution.found_by["card__spinner"], StyleSource::Behavior);
    assert_eq!(resolution.inline_styles.len(), 1);
}

#[test]
fn convention_directories_above_the_component_are_searched() {
    let (repo, card) = card_repo("card theme-dark", "");
    write(
        repo.path(),
        "apps/site/styles/variables.scss",
        ".theme-dark { background: #111; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "theme-dark"]));

    assert_eq!(resolution.found_by["theme-dark"], StyleSource::Convention);
}

#[test]
fn repository_fallback_finds_leftovers_and_reports_missing() {
    let (repo, card) = card_repo("card legacy ghost", "");
    write(
        repo.path(),
        "apps/site/clientlib-legacy/legacy.css",
        ".legacy { float: left; }\n",
    );
    let styles = resolver(&repo);

    let resolution = styles.resolve(&card, &set(&["card", "legacy", "ghost"]));

    assert_eq!(resolution.found_by["legacy"], StyleSource::RepositoryFallback);
    assert_eq!(resolution.missing_classes, set(&["ghost"]));
}

#[test]
fn summary_merges_dependency_rules_with_prefixed_sources() {
    let (repo, card) = card_repo("card", "");
    write(
        repo.path(),
        "apps/site/components/title/title.html",
        "<h2 class=\"title\"></h2>\n",
    );
    write(
        repo.path(),
        "apps/site/components/title/title.css",
        ".title { font-size: 2rem; }\n",
    );
    let styles = resolver(&repo);

    let mut summary = styles.summarize(&card);
    let dep = styles.summarize(&repo.path().join("apps/site/components/title"));
    summary.merge_dependency("site/components/title", &dep);

    let sources = &summary.rules["title"];
    assert!(sources.contains_key("[site/components/title] apps/site/components/title/title.css"));
    assert!(summary.found_classes.contains("title"));
    assert!(summary.missing_classes.is_empty());
}
