//! Every workspace crate must inherit the workspace version.

use std::path::Path;

fn workspace_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
}

fn workspace_version() -> String {
    let root_toml = std::fs::read_to_string(workspace_root().join("Cargo.toml")).unwrap();
    let doc: toml::Value = root_toml.parse().unwrap();
    doc["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

/// `"workspace"` when the crate uses `version.workspace = true`, else the literal.
fn crate_version(manifest_dir: &Path) -> String {
    let toml_str = std::fs::read_to_string(manifest_dir.join("Cargo.toml")).unwrap();
    let doc: toml::Value = toml_str.parse().unwrap();
    let version = &doc["package"]["version"];
    if let Some(table) = version.as_table() {
        if table.get("workspace").and_then(|v| v.as_bool()) == Some(true) {
            return "workspace".to_string();
        }
    }
    match version.as_str() {
        Some(v) => v.to_string(),
        None => panic!(
            "Could not read version from {}",
            manifest_dir.join("Cargo.toml").display()
        ),
    }
}

#[test]
fn all_crates_use_workspace_version() {
    for krate in ["crates/aemport-core", "crates/aemport-agents", "crates/aemport-cli"] {
        let version = crate_version(&workspace_root().join(krate));
        assert_eq!(
            version, "workspace",
            "{krate} should use version.workspace = true, got version = {version:?}"
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    assert_eq!(workspace_version(), aemport_core::VERSION);
}
