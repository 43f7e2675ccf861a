//! Scanner for `~[name]` capture placeholders.
//!
//! The scanner never fails: `~[]` and unterminated `~[` are left as literal text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

pub const PREFIX: &str = "~[";
pub const SUFFIX: &str = "]";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"~\[([^\]]+)\]").unwrap_or_else(|e| panic!("placeholder pattern: {}", e))
});

/// A placeholder occurrence inside an expected string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub name: &'a str,
    /// Byte span of the delimited form, delimiters included.
    pub span: Range<usize>,
}

/// All placeholders in `text`, left to right.
pub fn scan(text: &str) -> Vec<Placeholder<'_>> {
    if !text.contains(PREFIX) {
        return Vec::new();
    }
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some(Placeholder {
                name: name.as_str(),
                span: whole.range(),
            })
        })
        .collect()
}

/// The placeholder name when `text` is nothing but one placeholder.
pub fn standalone(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if inner.is_empty() || inner.contains(']') {
        return None;
    }
    Some(inner)
}

/// Wrap `name` in placeholder delimiters.
pub fn placeholder(name: &str) -> String {
    format!("{}{}{}", PREFIX, name, SUFFIX)
}
