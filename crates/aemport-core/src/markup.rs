//! Text heuristics over HTL markup and component node definitions.
//!
//! These are deliberately shallow scanners: they pick component references,
//! class names and style-bundle citations out of template text without a
//! full HTL parser.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static RESOURCE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bresourceType\s*=\s*(?:'([^']+)'|"([^"]+)")"#).expect("valid regex")
});

static RESOURCE_SUPER_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"sling:resourceSuperType\s*=\s*"([^"]+)""#).expect("valid regex")
});

static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:\bclass|data-sly-attribute\.class|\bclassName)\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
    .expect("valid regex")
});

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid regex"));

static QUOTED_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("valid regex"));

static CLASS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[_a-zA-Z][_a-zA-Z0-9-]*$").expect("valid regex"));

static SLY_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-sly-call\s*=\s*"\$\{([^"]*)\}""#).expect("valid regex")
});

static CATEGORIES_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"categories\s*=\s*(?:\[([^\]]*)\]|'([^']*)')").expect("valid regex")
});

static PATH_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpath\s*=\s*'([^']+)'").expect("valid regex"));

/// Style citations declared in markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleReferences {
    pub categories: Vec<String>,
    pub paths: Vec<String>,
}

impl StyleReferences {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.paths.is_empty()
    }
}

fn push_unique(out: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !out.iter().any(|v| v == value) {
        out.push(value.to_string());
    }
}

/// Component-inclusion references (`data-sly-resource ... resourceType='x'`)
/// in order of first appearance. Expression-valued types are skipped.
pub fn extract_component_references(markup: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in RESOURCE_TYPE.captures_iter(markup) {
        let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(value) = value {
            if !value.contains("${") {
                push_unique(&mut out, value);
            }
        }
    }
    out
}

/// `sling:resourceSuperType` declared in a component's `.content.xml`.
pub fn extract_super_type(node_definition: &str) -> Option<String> {
    RESOURCE_SUPER_TYPE
        .captures(node_definition)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty() && !s.contains("${"))
}

/// Class names used by markup. Literal tokens inside `${...}` expressions
/// (e.g. `${on ? 'is-active' : ''}`) are kept; the expression text is not.
pub fn extract_class_names(markup: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for caps in CLASS_ATTR.captures_iter(markup) {
        let Some(value) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let value = value.as_str();
        for expr in EXPRESSION.captures_iter(value) {
            for literal in QUOTED_LITERAL.captures_iter(&expr[1]) {
                collect_tokens(&literal[1], &mut out);
            }
        }
        let stripped = EXPRESSION.replace_all(value, " ");
        collect_tokens(&stripped, &mut out);
    }
    out
}

/// Whether `token` is a plain CSS class identifier.
pub fn is_class_token(token: &str) -> bool {
    CLASS_TOKEN.is_match(token)
}

fn collect_tokens(text: &str, out: &mut BTreeSet<String>) {
    for token in text.split_whitespace() {
        if is_class_token(token) {
            out.insert(token.to_string());
        }
    }
}

/// Style bundle categories and file paths cited through `data-sly-call`.
pub fn extract_style_references(markup: &str) -> StyleReferences {
    let mut refs = StyleReferences::default();
    for call in SLY_CALL.captures_iter(markup) {
        let expr = &call[1];
        for caps in CATEGORIES_OPTION.captures_iter(expr) {
            if let Some(list) = caps.get(1) {
                for item in list.as_str().split(',') {
                    let item = item.trim().trim_matches(|c| c == '\'' || c == '"');
                    push_unique(&mut refs.categories, item);
                }
            } else if let Some(single) = caps.get(2) {
                for item in single.as_str().split(',') {
                    push_unique(&mut refs.categories, item);
                }
            }
        }
        for caps in PATH_OPTION.captures_iter(expr) {
            push_unique(&mut refs.paths, &caps[1]);
        }
    }
    refs
}
