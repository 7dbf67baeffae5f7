//! Prompt text for the model-backed collaborators.

use std::fmt::Write as _;

use aemport_core::{
    AnalysisRequest, DesignHint, FileAnalysis, FileKind, GenerationRequest, RepairRequest,
    ReviewRequest, StyleSummary,
};

/// Longest source excerpt placed into a single prompt.
pub const MAX_SOURCE_CHARS: usize = 24_000;

/// Longest single style rule quoted back to the generator.
const MAX_RULE_CHARS: usize = 1_200;

/// `text` cut to `max` characters, marking the cut.
pub fn clip(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n/* ... truncated ... */", &text[..idx]),
        None => text.to_string(),
    }
}

pub const ANALYSIS_SYSTEM: &str = r#"You are an Adobe Experience Manager component analyst.
You analyse one component source file at a time and describe it for a developer
who will rebuild the component in React.

Answer with a single JSON object and nothing else:
{
  "file_type": "markup | dialog | config | behavior | model | style | data | other",
  "purpose": "one or two sentences",
  "properties": [{"name": "...", "type": "...", "description": "..."}],
  "structure": ["notable elements, slots or child resources"],
  "dependencies": ["referenced components, services or client libraries"],
  "behaviors": ["interactions, events, state changes"],
  "notes": ["anything that affects a faithful conversion"]
}"#;

pub const GENERATION_SYSTEM: &str = r#"You are an expert React developer converting Adobe Experience Manager
components into React function components.

Rules:
- One default-exported function component named exactly as requested.
- Props come from the dialog and model analyses; keep their names.
- Reproduce the markup structure and the behaviors described.
- Import already generated dependency components instead of re-implementing them.
- Put styles in a CSS module; keep the original class names.
- No dangerouslySetInnerHTML unless the source renders rich text, and then sanitise it.

Answer with a single JSON object and nothing else:
{
  "source": "complete component source",
  "style_source": "complete CSS module text, or null",
  "manifest": {"imports": ["..."], "dependencies": ["npm packages"], "entry_symbol": "ComponentName"},
  "notes": ["conversion decisions worth reviewing"]
}"#;

pub const REPAIR_SYSTEM: &str = r#"You fix generated React components using review findings.

Fix every failing finding, most severe first, without changing the component
name, its props or its behavior. Return the COMPLETE corrected component, never
a diff.

Answer with a single JSON object and nothing else:
{
  "source": "complete corrected component source",
  "style_source": "complete CSS module text, or null to keep the current one",
  "manifest": {"imports": ["..."], "dependencies": ["..."], "entry_symbol": "ComponentName"},
  "notes": ["what was changed and why"]
}"#;

/// Reply format shared by every review preset.
pub const REVIEW_FORMAT: &str = r#"Answer with a single JSON object and nothing else:
{
  "passed": true | false,
  "severity": "none | low | medium | high | critical",
  "issues": ["each problem found"],
  "recommendations": ["a concrete fix for each problem"]
}
"severity" is the worst problem found; use "none" when there is nothing to report."#;

pub const SECURITY_FOCUS: &str = r#"You are a security reviewer for React code. Look for:
cross-site scripting, unsafe dangerouslySetInnerHTML, unsafe URL handling
(javascript: links, unvalidated redirects), injection through string-built
markup or queries, exposure of secrets or personal data, and missing input
validation on user-controlled values."#;

pub const STYLE_FOCUS: &str = r#"You review whether a React component's styling matches the original
component. Check that every class used in the markup has a rule in the CSS
module or is imported from a dependency, that class names were not renamed,
that responsive rules survived, and that no global selectors leak out of the
module."#;

pub const PROPS_FOCUS: &str = r#"You review a React component's props. Check that props have clear names
and defaults, that optional values are guarded before use, that lists are
keyed, and that the component does not read values it never receives."#;

pub const BEHAVIOR_FOCUS: &str = r#"You review a React component's behavior. Check that event handlers are
attached correctly, that effects declare their dependencies and clean up
listeners and timers, that state updates cannot loop, and that interactive
elements stay keyboard accessible."#;

pub const DESIGN_FOCUS: &str = r#"You review whether a React component uses the design library well.
Check that it composes library components where the original markup has an
equivalent (buttons, form fields, cards, tabs, dialogs, grids) instead of
re-implementing them with raw elements, that library components get their
documented props rather than overriding their internals with custom CSS, and
that layout uses the library's grid or container primitives."#;

fn kind_hint(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Markup => "This is an HTL template: focus on structure, expressions and included resources.",
        FileKind::Dialog => "This is an authoring dialog: every field becomes a prop.",
        FileKind::Config => "This is the component node definition: note the title, group and super type.",
        FileKind::Behavior => "This is client-side script: focus on events, DOM changes and state.",
        FileKind::Model => "This is a Sling model: focus on exposed getters and their types.",
        FileKind::Style => "This is a stylesheet: focus on class names and responsive rules.",
        FileKind::Data => "This is a data file: describe its shape.",
        FileKind::Other => "Describe whatever is relevant to a React conversion.",
    }
}

pub fn analysis_prompt(request: &AnalysisRequest) -> String {
    format!(
        "Component: {id}\nFile: {path}\n{hint}\n\n```\n{content}\n```",
        id = request.component_id,
        path = request.path.display(),
        hint = kind_hint(request.kind),
        content = clip(&request.content, MAX_SOURCE_CHARS),
    )
}

fn push_analyses(out: &mut String, title: &str, analyses: &[&FileAnalysis]) {
    if analyses.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {title}");
    for analysis in analyses {
        let _ = writeln!(
            out,
            "### {}\n{}",
            analysis.path.display(),
            serde_json::to_string_pretty(&analysis.content).unwrap_or_default()
        );
    }
    out.push('\n');
}

fn push_design_hints(out: &mut String, hints: &[DesignHint]) {
    if hints.is_empty() {
        return;
    }
    out.push_str("## Design library\nPrefer these library components where they fit:\n");
    for hint in hints {
        let _ = writeln!(out, "- {}: {}", hint.feature, hint.components.join(", "));
        for location in &hint.locations {
            let _ = writeln!(out, "  - {}", location.display());
        }
    }
    out.push('\n');
}

fn push_styles(out: &mut String, styles: &StyleSummary) {
    if styles.is_empty() {
        return;
    }
    out.push_str("## Styles\n");
    if !styles.component_style_files.is_empty() {
        let _ = writeln!(
            out,
            "Component style files: {}",
            styles.component_style_files.join(", ")
        );
    }
    for (class, sources) in &styles.rules {
        for (source, rule) in sources {
            let _ = writeln!(out, "/* .{class} from {source} */\n{}", clip(rule, MAX_RULE_CHARS));
        }
    }
    for (label, text) in &styles.inline_styles {
        let _ = writeln!(out, "/* injected by {label} */\n{}", clip(text, MAX_RULE_CHARS));
    }
    if !styles.missing_classes.is_empty() {
        let missing: Vec<&str> = styles.missing_classes.iter().map(String::as_str).collect();
        let _ = writeln!(out, "No rules found for: {}", missing.join(", "));
    }
    out.push('\n');
}

pub fn generation_prompt(request: &GenerationRequest) -> String {
    let mut out = format!(
        "Convert the AEM component `{}` into a React component named `{}`.\n\n",
        request.component_id, request.display_name
    );
    push_analyses(&mut out, "Props (dialog, model, node definition)", &request.data_shape());
    push_analyses(&mut out, "Markup structure", &request.ui_structure());
    push_analyses(&mut out, "Behavior", &request.behavior());

    for (dep_id, analyses) in &request.dependency_analyses {
        let live: Vec<&FileAnalysis> = analyses.iter().filter(|a| !a.is_placeholder()).collect();
        push_analyses(&mut out, &format!("Dependency {dep_id}"), &live);
    }
    if !request.existing_dependencies.is_empty() {
        out.push_str("## Already generated (import these)\n");
        for entry in &request.existing_dependencies {
            let _ = writeln!(
                out,
                "- {} -> import {} from './{}'",
                entry.component_id,
                entry.display_name,
                entry
                    .artifact_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| entry.display_name.clone())
            );
        }
        out.push('\n');
    }
    if !request.unresolved_dependencies.is_empty() {
        let _ = writeln!(
            out,
            "## Unresolved references\nThese could not be found; render a neutral placeholder for each: {}\n",
            request.unresolved_dependencies.join(", ")
        );
    }
    push_design_hints(&mut out, &request.design_hints);
    push_styles(&mut out, &request.styles);
    out
}

pub fn repair_prompt(request: &RepairRequest) -> String {
    let mut out = format!(
        "Repair iteration {} for `{}` ({}).\n\n## Failing findings\n",
        request.iteration + 1,
        request.display_name,
        request.component_id
    );
    for finding in &request.failing_findings {
        let _ = writeln!(out, "### {} ({})", finding.check_name, finding.severity);
        for issue in &finding.issues {
            let _ = writeln!(out, "- issue: {issue}");
        }
        for rec in &finding.recommendations {
            let _ = writeln!(out, "- fix: {rec}");
        }
    }
    let _ = write!(
        out,
        "\n## Current source\n```jsx\n{}\n```\n",
        clip(&request.artifact.source, MAX_SOURCE_CHARS)
    );
    if let Some(css) = &request.artifact.style_source {
        let _ = write!(
            out,
            "\n## Current CSS module\n```css\n{}\n```\n",
            clip(css, MAX_SOURCE_CHARS)
        );
    }
    out
}

pub fn review_prompt(request: &ReviewRequest) -> String {
    let mut out = format!(
        "Review `{}` generated from `{}`.\n\n```jsx\n{}\n```\n",
        request.display_name,
        request.component_id,
        clip(&request.source, MAX_SOURCE_CHARS)
    );
    if let Some(css) = &request.style_source {
        let _ = write!(out, "\nCSS module:\n```css\n{}\n```\n", clip(css, MAX_SOURCE_CHARS));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use aemport_core::{ReviewFinding, Severity};
    use std::path::PathBuf;

    #[test]
    fn test_clip_is_char_safe() {
        assert_eq!(clip("héllo", 10), "héllo");
        let clipped = clip("héllo wörld", 4);
        assert!(clipped.starts_with("héll"));
        assert!(clipped.contains("truncated"));
    }

    #[test]
    fn test_generation_prompt_lists_reuse_and_unresolved() {
        let request = GenerationRequest {
            component_id: "site/card".to_string(),
            display_name: "Card".to_string(),
            existing_dependencies: vec![aemport_core::RegistryEntry {
                component_id: "site/title".to_string(),
                artifact_path: PathBuf::from("out/Title.jsx"),
                style_path: None,
                display_name: "Title".to_string(),
            }],
            unresolved_dependencies: vec!["site/ghost".to_string()],
            ..GenerationRequest::default()
        };
        let prompt = generation_prompt(&request);
        assert!(prompt.contains("import Title from './Title'"));
        assert!(prompt.contains("site/ghost"));
        assert!(prompt.contains("named `Card`"));
    }

    #[test]
    fn test_generation_prompt_lists_design_hints() {
        let request = GenerationRequest {
            component_id: "site/tabs".to_string(),
            display_name: "Tabs".to_string(),
            design_hints: vec![DesignHint {
                feature: "tabs".to_string(),
                components: vec!["Tabs".to_string(), "Tab".to_string()],
                locations: vec![PathBuf::from("/lib/src/Tabs.tsx")],
            }],
            ..GenerationRequest::default()
        };
        let prompt = generation_prompt(&request);
        assert!(prompt.contains("## Design library"));
        assert!(prompt.contains("- tabs: Tabs, Tab"));
        assert!(prompt.contains("  - /lib/src/Tabs.tsx"));

        let plain = generation_prompt(&GenerationRequest::default());
        assert!(!plain.contains("Design library"));
    }

    #[test]
    fn test_repair_prompt_includes_findings() {
        let request = RepairRequest {
            component_id: "site/card".to_string(),
            display_name: "Card".to_string(),
            artifact: aemport_core::GeneratedArtifact {
                source: "export default function Card() {}".to_string(),
                ..Default::default()
            },
            failing_findings: vec![ReviewFinding::fail("security", Severity::High, "xss in title")
                .with_recommendation("escape the title")],
            iteration: 0,
        };
        let prompt = repair_prompt(&request);
        assert!(prompt.contains("Repair iteration 1"));
        assert!(prompt.contains("### security (high)"));
        assert!(prompt.contains("- fix: escape the title"));
    }
}
