//! Error types shared by all matchers.

use crate::value::{Captures, Value};
use std::time::Duration;

/// Appended to failures while regex interpretation is active.
pub const REGEX_HINT: &str = "Matching is by default done using regular expressions.\n\
If expected object contains any unintentional regexes, then quote them between \\Q and \\E delimiters.";

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The actual value does not satisfy the expected pattern.
    #[error("{message}")]
    Mismatch {
        message: String,
        expected: String,
        actual: String,
    },

    /// A value could not be read as the attempted representation.
    #[error("Invalid representation: {0}")]
    InvalidRepresentation(String),

    #[error("Polling timed out after {attempts} attempt(s) in {elapsed:?}\n{last_mismatch}")]
    PollingTimeout {
        attempts: u32,
        elapsed: Duration,
        last_actual: Box<Value>,
        last_mismatch: Box<MatchError>,
    },
}

impl MatchError {
    pub fn mismatch(
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        MatchError::Mismatch {
            message: message.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, MatchError::Mismatch { .. })
    }

    pub fn is_invalid_representation(&self) -> bool {
        matches!(self, MatchError::InvalidRepresentation(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MatchError::PollingTimeout { .. })
    }
}

/// Prefix a failure body with the caller's label, if any.
pub(crate) fn labelled(label: Option<&str>, body: &str) -> String {
    match label {
        Some(label) if !label.is_empty() => format!("{}\n{}", label, body),
        _ => body.to_string(),
    }
}

/// Flip an outcome: a success becomes the mismatch built by `matched`, a mismatch
/// becomes an empty success. Other errors pass through untouched.
pub(crate) fn invert(
    outcome: Result<Captures, MatchError>,
    matched: impl FnOnce() -> MatchError,
) -> Result<Captures, MatchError> {
    match outcome {
        Ok(_) => Err(matched()),
        Err(MatchError::Mismatch { .. }) => Ok(Captures::new()),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_message() {
        assert_eq!(labelled(Some("check"), "boom"), "check\nboom");
        assert_eq!(labelled(Some(""), "boom"), "boom");
        assert_eq!(labelled(None, "boom"), "boom");
    }

    #[test]
    fn test_invert_outcomes() {
        let flipped = invert(Ok(Captures::new()), || MatchError::mismatch("matched", "a", "a"));
        assert!(matches!(flipped, Err(MatchError::Mismatch { ref message, .. }) if message == "matched"));

        let flipped = invert(Err(MatchError::mismatch("no", "a", "b")), || unreachable!());
        assert!(flipped.unwrap().is_empty());

        let kept = invert(
            Err(MatchError::InvalidRepresentation("bad".into())),
            || unreachable!(),
        );
        assert!(kept.unwrap_err().is_invalid_representation());
    }

    #[test]
    fn test_timeout_display_includes_last_mismatch() {
        let err = MatchError::PollingTimeout {
            attempts: 3,
            elapsed: Duration::from_millis(10),
            last_actual: Box::new(Value::Int(1)),
            last_mismatch: Box::new(MatchError::mismatch("Strings do not match", "2", "1")),
        };
        let text = err.to_string();
        assert!(text.contains("after 3 attempt(s)"));
        assert!(text.contains("Strings do not match"));
        assert!(err.is_timeout());
    }
}
