//! Tagged-text extraction and JSON cleanup helpers.
//!
//! Model completions carry their machine-readable payload inside XML-style
//! tags; the rest of the completion is free-form reasoning. Extraction scans
//! right-to-left so the final (post-reasoning) occurrence wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref NULL_TOKEN: Regex = Regex::new(r"(?i)\bNULL\b").expect("static regex");
}

/// Extract the text inside the last well-formed `<tag>...</tag>` pair,
/// narrowing the search window up to 5 times when a malformed pair is hit.
pub fn text_within_tags(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut bound = text.len();
    for _ in 0..5 {
        let window = &text[..bound];
        let end = window.rfind(&close);
        let start = window.rfind(&open);
        match (start, end) {
            (Some(start), Some(end)) => {
                let content_start = start + open.len();
                if content_start <= end {
                    let response = text[content_start..end].trim();
                    if !response.is_empty() {
                        return response.to_string();
                    }
                }
                // Narrow past the open tag and look again.
                bound = start;
            }
            _ => return String::new(),
        }
        if bound == 0 {
            break;
        }
    }
    String::new()
}

/// Replace bare `NULL` tokens (any case) with an empty JSON string so the
/// payload parses.
pub fn clean_json_string(text: &str) -> String {
    NULL_TOKEN.replace_all(text, "\"\"").into_owned()
}

/// Recursively uppercase every string in a JSON value.
pub fn uppercase_json(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        Value::Array(items) => Value::Array(items.into_iter().map(uppercase_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, uppercase_json(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_last_occurrence() {
        let text = "<results>first</results> reasoning <results>second</results>";
        assert_eq!(text_within_tags(text, "results"), "second");
    }

    #[test]
    fn missing_tags_yield_empty() {
        assert_eq!(text_within_tags("no tags here", "results"), "");
        assert_eq!(text_within_tags("<results>unclosed", "results"), "");
    }

    #[test]
    fn narrows_past_trailing_unclosed_tag() {
        let text = "<results>good</results><results>";
        assert_eq!(text_within_tags(text, "results"), "good");
    }

    #[test]
    fn empty_content_is_skipped() {
        let text = "<results>value</results><results>  </results>";
        assert_eq!(text_within_tags(text, "results"), "value");
    }

    #[test]
    fn null_tokens_become_empty_strings() {
        let cleaned = clean_json_string(r#"{"INDUSTRY": NULL, "FOCUS_AREA": null}"#);
        assert_eq!(cleaned, r#"{"INDUSTRY": "", "FOCUS_AREA": ""}"#);
        // does not touch NULL inside a longer word
        assert_eq!(clean_json_string("NULLABLE"), "NULLABLE");
    }

    #[test]
    fn uppercase_json_recurses() {
        let value = json!({
            "NAME": "Acme Corp",
            "TAGS": ["cloud", "ai"],
            "NESTED": {"focus": "chips"},
            "COUNT": 3,
        });
        let upper = uppercase_json(value);
        assert_eq!(upper["NAME"], "ACME CORP");
        assert_eq!(upper["TAGS"][0], "CLOUD");
        assert_eq!(upper["NESTED"]["focus"], "CHIPS");
        assert_eq!(upper["COUNT"], 3);
    }
}
