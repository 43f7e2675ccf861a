//! Compilation of expected text into a placeholder-aware pattern.
//!
//! Expected text is classified exactly once as [`Syntax::Regex`] or
//! [`Syntax::Literal`]; the rest of the matcher only looks at that tag.

use crate::placeholder::{self, Placeholder};
use crate::value::{Captures, Value};
use regex::{Regex, RegexBuilder};

/// How the non-placeholder parts of an expected string are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Regex,
    Literal,
}

/// Decide how `expected` is read. Regex wins when enabled and the text compiles as-is.
pub fn classify(expected: &str, regex_enabled: bool) -> Syntax {
    if regex_enabled && anchored(&translate_quotes(expected)).is_ok() {
        Syntax::Regex
    } else {
        Syntax::Literal
    }
}

/// Rewrite `\Q...\E` quoted sections into escaped regex source.
///
/// An unterminated `\Q` quotes everything up to the end of the text.
pub fn translate_quotes(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("\\Q") {
        out.push_str(&rest[..start]);
        let quoted = &rest[start + 2..];
        match quoted.find("\\E") {
            Some(end) => {
                out.push_str(&regex::escape(&quoted[..end]));
                rest = &quoted[end + 2..];
            }
            None => {
                out.push_str(&regex::escape(quoted));
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn anchored(body: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(r"\A(?:{})\z", body))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()
}

fn group_name(index: usize) -> String {
    format!("__ph{}", index)
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Full-match regex; placeholders map to named groups in order.
    Regex {
        regex: Regex,
        groups: Vec<(String, String)>,
    },
    /// Plain equality with the expected text.
    Exact(String),
}

/// An expected string compiled for repeated matching.
#[derive(Debug, Clone)]
pub struct TextPattern {
    syntax: Syntax,
    matcher: Matcher,
}

impl TextPattern {
    pub fn compile(expected: &str, regex_enabled: bool) -> TextPattern {
        let placeholders = placeholder::scan(expected);
        let syntax = classify(expected, regex_enabled);

        if placeholders.is_empty() {
            let matcher = match syntax {
                Syntax::Regex => match anchored(&translate_quotes(expected)) {
                    Ok(regex) => Matcher::Regex {
                        regex,
                        groups: Vec::new(),
                    },
                    Err(_) => Matcher::Exact(expected.to_string()),
                },
                Syntax::Literal => Matcher::Exact(expected.to_string()),
            };
            return TextPattern { syntax, matcher };
        }

        let groups: Vec<(String, String)> = placeholders
            .iter()
            .enumerate()
            .map(|(i, p)| (group_name(i), p.name.to_string()))
            .collect();

        let templated = match syntax {
            Syntax::Regex => anchored(&template(expected, &placeholders, translate_quotes)).ok(),
            Syntax::Literal => None,
        };
        let regex = match templated {
            Some(regex) => regex,
            None => {
                match anchored(&template(expected, &placeholders, |s| regex::escape(s))) {
                    Ok(regex) => regex,
                    // escaped fragments always compile; keep equality as the last resort
                    Err(_) => {
                        return TextPattern {
                            syntax: Syntax::Literal,
                            matcher: Matcher::Exact(expected.to_string()),
                        }
                    }
                }
            }
        };
        TextPattern {
            syntax,
            matcher: Matcher::Regex { regex, groups },
        }
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Match the whole of `actual`, returning the placeholder captures on success.
    pub fn captures(&self, actual: &str) -> Option<Captures> {
        match &self.matcher {
            Matcher::Exact(expected) => (expected == actual).then(Captures::new),
            Matcher::Regex { regex, groups } => {
                let caps = regex.captures(actual)?;
                let mut captured = Captures::with_capacity(groups.len());
                for (group, name) in groups {
                    let text = caps.name(group).map(|m| m.as_str()).unwrap_or_default();
                    captured.insert(name.clone(), Value::Text(text.to_string()));
                }
                Some(captured)
            }
        }
    }
}

/// Join the fragments around placeholders, rendered by `fragment`, with named wildcard groups.
fn template(
    expected: &str,
    placeholders: &[Placeholder<'_>],
    fragment: impl Fn(&str) -> String,
) -> String {
    let mut out = String::new();
    let mut cursor = 0;
    for (i, p) in placeholders.iter().enumerate() {
        out.push_str(&fragment(&expected[cursor..p.span.start]));
        out.push_str(&format!("(?P<{}>.*)", group_name(i)));
        cursor = p.span.end;
    }
    out.push_str(&fragment(&expected[cursor..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(captures: &Captures, name: &str) -> String {
        captures[name].to_text()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("a.*b", true), Syntax::Regex);
        assert_eq!(classify("a.*b", false), Syntax::Literal);
        assert_eq!(classify("unbalanced (", true), Syntax::Literal);
        // look-around is not supported by the regex engine
        assert_eq!(classify("(?=x)y", true), Syntax::Literal);
    }

    #[test]
    fn test_translate_quotes() {
        assert_eq!(translate_quotes(r"a\Q.*\Eb"), r"a\.\*b");
        assert_eq!(translate_quotes(r"\Q(x"), r"\(x");
        assert_eq!(translate_quotes("plain"), "plain");
    }

    #[test]
    fn test_regex_template_captures() {
        let pattern = TextPattern::compile("user ~[name] has \\d+ ~[unit]", true);
        assert_eq!(pattern.syntax(), Syntax::Regex);
        let caps = pattern.captures("User Bob has 12 apples").unwrap();
        assert_eq!(text(&caps, "name"), "Bob");
        assert_eq!(text(&caps, "unit"), "apples");
        assert!(pattern.captures("user Bob has many apples").is_none());
    }

    #[test]
    fn test_user_groups_do_not_shift_captures() {
        let pattern = TextPattern::compile("(a|b)-~[rest]", true);
        let caps = pattern.captures("b-tail").unwrap();
        assert_eq!(text(&caps, "rest"), "tail");
    }

    #[test]
    fn test_literal_template_when_not_a_regex() {
        let pattern = TextPattern::compile("(value ~[v]", true);
        assert_eq!(pattern.syntax(), Syntax::Literal);
        let caps = pattern.captures("(value 42").unwrap();
        assert_eq!(text(&caps, "v"), "42");
    }

    #[test]
    fn test_regex_disabled_quotes_metacharacters() {
        let pattern = TextPattern::compile("a.c ~[x]", false);
        assert!(pattern.captures("abc 1").is_none());
        assert_eq!(text(&pattern.captures("a.c 1").unwrap(), "x"), "1");
    }

    #[test]
    fn test_full_match_multiline_and_case() {
        let pattern = TextPattern::compile("first.*last", true);
        assert!(pattern.captures("FIRST line\nlast").is_some());
        assert!(pattern.captures("first line\nlast\nextra!").is_none());
    }

    #[test]
    fn test_exact_literal_without_placeholders() {
        let pattern = TextPattern::compile("[unclosed", true);
        assert!(pattern.captures("[unclosed").is_some());
        assert!(pattern.captures("[UNCLOSED").is_none());
    }
}
