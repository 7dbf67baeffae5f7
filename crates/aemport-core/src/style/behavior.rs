//! Client-side script scanning: injected style text and dynamically added
//! class names.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::markup::is_class_token;

static INJECTED_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)(?:textContent|innerHTML|innerText|cssText)\s*\+?=\s*(?:`([^`]*)`|'([^']*)'|"([^"]*)")"#,
    )
    .expect("valid regex")
});

static INSERT_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)insertRule\(\s*(?:`([^`]*)`|'([^']*)'|"([^"]*)")"#).expect("valid regex")
});

static CLASS_LIST_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"classList\.(?:add|toggle|replace)\(([^)]*)\)").expect("valid regex")
});

static CLASS_NAME_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"className\s*\+?=\s*(?:'([^']*)'|"([^"]*)"|`([^`$]*)`)"#).expect("valid regex")
});

static JQUERY_CLASS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.(?:addClass|toggleClass)\(\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid regex")
});

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("valid regex"));

fn first_group<'t>(caps: &regex::Captures<'t>) -> Option<&'t str> {
    (1..caps.len()).find_map(|i| caps.get(i)).map(|m| m.as_str())
}

/// Style sheet text assigned to elements or inserted through the CSSOM.
pub fn injected_style_blocks(script: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in INJECTED_STYLE
        .captures_iter(script)
        .chain(INSERT_RULE.captures_iter(script))
    {
        if let Some(text) = first_group(&caps) {
            let text = text.trim();
            if text.contains('{') && text.contains('}') && !out.iter().any(|t| t == text) {
                out.push(text.to_string());
            }
        }
    }
    out
}

/// Class names a script adds at runtime.
pub fn dynamic_class_names(script: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut take = |text: &str| {
        for token in text.split_whitespace() {
            if is_class_token(token) {
                out.insert(token.to_string());
            }
        }
    };
    for caps in CLASS_LIST_CALL.captures_iter(script) {
        for literal in STRING_LITERAL.captures_iter(&caps[1]) {
            if let Some(text) = first_group(&literal) {
                take(text);
            }
        }
    }
    for caps in CLASS_NAME_ASSIGN
        .captures_iter(script)
        .chain(JQUERY_CLASS_CALL.captures_iter(script))
    {
        if let Some(text) = first_group(&caps) {
            take(text);
        }
    }
    out
}
