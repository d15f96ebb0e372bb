//! Selector normalization
//!
//! Widgeteer's native selector syntax is `@key:value`, optionally composed
//! into hierarchical paths such as `mainWindow/formTab/@name:submit`. For
//! convenience the client also accepts a CSS-like syntax and rewrites it
//! before anything goes on the wire:
//!
//! ```text
//! #submitButton          -> @name:submitButton
//! .QPushButton           -> @class:QPushButton
//! [text="Submit"]        -> @text:Submit
//! [accessible="Label"]   -> @accessible:Label
//! [name="ok"]            -> @name:ok
//! [class="QLineEdit"]    -> @class:QLineEdit
//! mainWindow/#submitBtn  -> mainWindow/@name:submitBtn
//! ```
//!
//! Normalization is purely lexical and idempotent.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::protocol::Params;

/// CSS-like patterns and their native replacements, tried in order
static SELECTOR_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^#([a-zA-Z_][a-zA-Z0-9_]*)$", "@name:${1}"),
        (r"^\.([a-zA-Z_][a-zA-Z0-9_]*)$", "@class:${1}"),
        (r#"^\[text=["'](.+)["']\]$"#, "@text:${1}"),
        (r#"^\[accessible=["'](.+)["']\]$"#, "@accessible:${1}"),
        (r#"^\[name=["'](.+)["']\]$"#, "@name:${1}"),
        (r#"^\[class=["'](.+)["']\]$"#, "@class:${1}"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Param keys whose string values are selectors
pub const SELECTOR_KEYS: [&str; 5] = ["target", "from", "to", "root", "query"];

/// Convert a selector in either syntax to the native one
pub fn normalize(selector: &str) -> String {
    if selector.is_empty() {
        return String::new();
    }

    if selector.contains('/') {
        return selector
            .split('/')
            .map(normalize_segment)
            .collect::<Vec<_>>()
            .join("/");
    }

    normalize_segment(selector)
}

fn normalize_segment(segment: &str) -> String {
    if segment.starts_with('@') {
        return segment.to_string();
    }

    for (pattern, replacement) in SELECTOR_RULES.iter() {
        if pattern.is_match(segment) {
            return pattern.replace(segment, *replacement).into_owned();
        }
    }

    // Plain objectName path component
    segment.to_string()
}

/// Normalize every selector-bearing value in a params object
pub fn normalize_params(params: &Params) -> Params {
    let mut result = params.clone();
    for key in SELECTOR_KEYS {
        if let Some(Value::String(selector)) = result.get_mut(key) {
            *selector = normalize(selector);
        }
    }
    result
}
