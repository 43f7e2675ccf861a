//! Placeholder-aware text matching.
//!
//! Both sides are rendered to text and the expected side is compiled into a
//! [`TextPattern`]. A standalone placeholder (`~[name]`) binds the actual value
//! unconverted; placeholders embedded in text capture the matched substring.

use crate::condition::{Condition, Conditions};
use crate::error::{invert, labelled, MatchError, REGEX_HINT};
use crate::pattern::{Syntax, TextPattern};
use crate::placeholder;
use crate::value::{Captures, Value};
use tracing::trace;

/// Match `actual` against the expected text pattern.
///
/// `Condition::Invert` flips the result, including the case where both sides are null.
pub fn match_text(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    let matcher = TextMatcher::new(conditions);
    let outcome = matcher.matches(message, expected, actual);
    if conditions.contains(Condition::Invert) {
        invert(outcome, || {
            let body = format!("Strings match!\n{}", matcher.hint());
            MatchError::mismatch(labelled(message, &body), expected.to_text(), actual.to_text())
        })
    } else {
        outcome
    }
}

/// The positive text matching algorithm, configured from a condition set.
#[derive(Debug, Clone, Copy)]
pub struct TextMatcher {
    regex_enabled: bool,
}

impl TextMatcher {
    pub fn new(conditions: &Conditions) -> Self {
        Self {
            regex_enabled: !conditions.contains(Condition::RegexDisabled),
        }
    }

    pub fn regex_enabled(&self) -> bool {
        self.regex_enabled
    }

    fn hint(&self) -> &'static str {
        if self.regex_enabled {
            REGEX_HINT
        } else {
            ""
        }
    }

    /// Run the match without inversion.
    pub fn matches(
        &self,
        message: Option<&str>,
        expected: &Value,
        actual: &Value,
    ) -> Result<Captures, MatchError> {
        if expected.is_null() {
            return if actual.is_null() {
                Ok(Captures::new())
            } else {
                Err(MatchError::mismatch(
                    labelled(message, "Expected null, but actual value is not null"),
                    "null",
                    actual.to_text(),
                ))
            };
        }

        let expected_text = expected.to_text();
        if let Some(name) = placeholder::standalone(&expected_text) {
            trace!(placeholder = name, "standalone placeholder binds raw value");
            let mut captures = Captures::new();
            captures.insert(name.to_string(), actual.clone());
            return Ok(captures);
        }

        if actual.is_null() {
            return Err(MatchError::mismatch(
                labelled(message, "Expected value is not null, but actual value is null"),
                expected_text,
                "null",
            ));
        }

        let actual_text = actual.to_text();
        let pattern = TextPattern::compile(&expected_text, self.regex_enabled);
        if let Some(captures) = pattern.captures(&actual_text) {
            return Ok(captures);
        }
        // A valid regex never falls back to equality
        if pattern.syntax() == Syntax::Literal && expected == actual {
            return Ok(Captures::new());
        }

        let body = format!(
            "Strings do not match\n{}\n\nExpected:\n{}\n\nBut got:\n{}",
            self.hint(),
            expected_text,
            actual_text
        );
        Err(MatchError::mismatch(
            labelled(message, &body),
            expected_text,
            actual_text,
        ))
    }
}
