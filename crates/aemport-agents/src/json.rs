//! Best-effort JSON extraction from model replies.

use aemport_core::CollaboratorOutput;
use serde::de::DeserializeOwned;

/// The JSON payload inside `text`: a fenced ```json block, else any fenced
/// block, else the first balanced `{...}` object, else the trimmed text.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        if let Some(end) = body.find("```") {
            let candidate = body[..end].trim();
            // drop a language tag line
            if let Some(nl) = candidate.find('\n') {
                if !candidate[..nl].trim_start().starts_with('{') {
                    return candidate[nl + 1..].trim();
                }
            }
            return candidate;
        }
    }
    first_object(text).unwrap_or_else(|| text.trim())
}

/// First balanced `{...}` span, ignoring braces inside string literals.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `Structured` when the reply holds a `T`, otherwise `Raw` with the full reply.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> CollaboratorOutput<T> {
    match serde_json::from_str(extract_json_block(reply)) {
        Ok(value) => CollaboratorOutput::Structured(value),
        Err(_) => CollaboratorOutput::Raw(reply.to_string()),
    }
}
