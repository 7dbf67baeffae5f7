//! Minimal CSS/LESS/SCSS block scanner used to pull class rules out of
//! style files. It understands comments, quoted strings, conditional group
//! at-rules and `&` nesting; it does not evaluate preprocessor logic.

use std::collections::{BTreeMap, BTreeSet};

/// Group at-rules whose bodies contain ordinary rules.
const GROUP_AT_RULES: &[&str] = &["@media", "@supports", "@layer", "@container", "@document"];

/// A rule block with its fully qualified selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBlock {
    pub selector: String,
    /// Source text of the block, wrapped in its enclosing group at-rules.
    pub text: String,
}

/// Remove `/* */` comments, and `//` line comments outside strings and urls.
pub fn strip_comments(css: &str) -> String {
    let bytes: Vec<char> = css.chars().collect();
    let mut out = String::with_capacity(css.len());
    let mut i = 0;
    let mut quote: Option<char> = None;
    // unquoted `url(...)` bodies may hold `//host/path`
    let mut in_url = false;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == '*' && bytes.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '(' => {
                let tail = out.get(out.len().saturating_sub(3)..).unwrap_or("");
                in_url = tail.eq_ignore_ascii_case("url");
                out.push(c);
                i += 1;
            }
            ')' => {
                in_url = false;
                out.push(c);
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&'/')
                && !in_url
                && (i == 0 || bytes[i - 1] != ':') =>
            {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Index of the `}` matching the `{` at `open`.
fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
        } else {
            match c {
                '"' | '\'' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Every rule block in `css`, including blocks nested in group at-rules
/// and preprocessor nesting.
pub fn parse_blocks(css: &str) -> Vec<CssBlock> {
    let clean = strip_comments(css);
    let chars: Vec<char> = clean.chars().collect();
    let mut out = Vec::new();
    scan(&chars, None, &[], &mut out);
    out
}

fn scan(chars: &[char], parent: Option<&str>, wrappers: &[String], out: &mut Vec<CssBlock>) {
    let mut start = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            ';' => {
                start = i + 1;
                i += 1;
            }
            '{' => {
                let prelude: String = chars[start..i].iter().collect::<String>().trim().to_string();
                let Some(close) = matching_brace(chars, i) else {
                    return;
                };
                let body = &chars[i + 1..close];
                let raw: String = chars[start..=close].iter().collect();
                handle_block(&prelude, raw.trim(), body, parent, wrappers, out);
                i = close + 1;
                start = i;
            }
            '}' => {
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
}

fn handle_block(
    prelude: &str,
    raw: &str,
    body: &[char],
    parent: Option<&str>,
    wrappers: &[String],
    out: &mut Vec<CssBlock>,
) {
    if prelude.starts_with('@') {
        let lowered = prelude.to_lowercase();
        if GROUP_AT_RULES.iter().any(|at| lowered.starts_with(at)) {
            let mut nested = wrappers.to_vec();
            nested.push(prelude.to_string());
            scan(body, parent, &nested, out);
        }
        return;
    }
    if prelude.is_empty() {
        return;
    }

    let selector = qualify(prelude, parent);
    let mut text = raw.to_string();
    for wrapper in wrappers.iter().rev() {
        text = format!("{wrapper} {{\n{text}\n}}");
    }
    out.push(CssBlock {
        selector: selector.clone(),
        text,
    });
    if body.contains(&'{') {
        scan(body, Some(&selector), wrappers, out);
    }
}

/// Resolve a nested selector against its parent (`&` substitution, or descendant).
fn qualify(selector: &str, parent: Option<&str>) -> String {
    match parent {
        None => selector.to_string(),
        Some(parent) => selector
            .split(',')
            .map(|part| {
                let part = part.trim();
                if part.contains('&') {
                    part.replace('&', parent)
                } else {
                    format!("{parent} {part}")
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Whether `selector` targets `.class_name` as a whole identifier.
pub fn selector_mentions_class(selector: &str, class_name: &str) -> bool {
    let needle = format!(".{class_name}");
    selector.match_indices(&needle).any(|(idx, _)| {
        let after = selector[idx + needle.len()..].chars().next();
        !matches!(after, Some(c) if c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Rule text for each wanted class found in `css`; several blocks for the
/// same class are joined in source order.
pub fn rules_for_classes(css: &str, wanted: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut found: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if wanted.is_empty() {
        return BTreeMap::new();
    }
    for block in parse_blocks(css) {
        for class_name in wanted {
            if selector_mentions_class(&block.selector, class_name) {
                let texts = found.entry(class_name.clone()).or_default();
                if !texts.contains(&block.text) {
                    texts.push(block.text.clone());
                }
            }
        }
    }
    found
        .into_iter()
        .map(|(class_name, texts)| (class_name, texts.join("\n")))
        .collect()
}

/// Class names defined by any selector in `css`.
pub fn defined_classes(css: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for block in parse_blocks(css) {
        let chars: Vec<char> = block.selector.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '.' {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].is_ascii_alphanumeric() || chars[j] == '-' || chars[j] == '_')
                {
                    j += 1;
                }
                if j > i + 1 && !chars[i + 1].is_ascii_digit() {
                    out.insert(chars[i + 1..j].iter().collect());
                }
                i = j;
            } else {
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wanted(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_class_match_respects_identifier_boundary() {
        assert!(selector_mentions_class(".card .title", "card"));
        assert!(selector_mentions_class("div.card:hover", "card"));
        assert!(!selector_mentions_class(".card-body", "card"));
        assert!(!selector_mentions_class(".cardinal", "card"));
    }

    #[test]
    fn test_comments_are_ignored() {
        let css = "/* .card { color: red } */\n.title { color: blue; }";
        let rules = rules_for_classes(css, &wanted(&["card", "title"]));
        assert!(!rules.contains_key("card"));
        assert!(rules["title"].contains("color: blue"));
    }

    #[test]
    fn test_media_query_wraps_rule() {
        let css = ".card { padding: 0 }\n@media (min-width: 768px) { .card { padding: 8px } }";
        let rules = rules_for_classes(css, &wanted(&["card"]));
        let text = &rules["card"];
        assert!(text.contains("padding: 0"));
        assert!(text.contains("@media (min-width: 768px) {"));
        assert!(text.contains("padding: 8px"));
    }

    #[test]
    fn test_keyframes_and_imports_are_skipped() {
        let css = "@import 'base.css';\n@keyframes spin { from { x: 1 } to { x: 2 } }\n.spin { animation: spin 1s }";
        let blocks = parse_blocks(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].selector, ".spin");
    }

    #[test]
    fn test_scss_nesting_resolves_ampersand() {
        let scss = ".card {\n  color: red;\n  &__title { font-weight: bold; }\n  .icon { width: 1em; }\n}";
        let rules = rules_for_classes(scss, &wanted(&["card__title", "icon"]));
        assert!(rules["card__title"].contains("font-weight: bold"));
        assert!(rules["icon"].contains("width: 1em"));
    }

    #[test]
    fn test_defined_classes() {
        let css = ".a, .b-c > .d_e { x: 1 } #id { y: 2 } .x1.y2 {}";
        assert_eq!(
            defined_classes(css),
            wanted(&["a", "b-c", "d_e", "x1", "y2"])
        );
    }

    #[test]
    fn test_url_with_double_slash_survives() {
        let css = ".hero { background: url(https://cdn.example.com/a.png); }";
        let rules = rules_for_classes(css, &wanted(&["hero"]));
        assert!(rules["hero"].contains("https://cdn.example.com/a.png"));
    }

    #[test]
    fn test_protocol_relative_url_keeps_following_rules() {
        let css = ".hero{background:url(//cdn.example.com/a.png)}.card{color:red}";
        let rules = rules_for_classes(css, &wanted(&["hero", "card"]));
        assert!(rules["hero"].contains("url(//cdn.example.com/a.png)"));
        assert!(rules["card"].contains("color:red"));
    }

    #[test]
    fn test_line_comment_after_url_is_still_stripped() {
        let scss = ".hero { background: url(//cdn.example.com/a.png); } // .ghost { x: 1 }\n\
                    .card { color: red; }";
        let rules = rules_for_classes(scss, &wanted(&["ghost", "card"]));
        assert!(!rules.contains_key("ghost"));
        assert!(rules.contains_key("card"));
    }
}
