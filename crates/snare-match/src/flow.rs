//! Dispatch between JSON, XML and text matching.

use crate::adapter::{match_json, match_xml};
use crate::condition::Conditions;
use crate::error::MatchError;
use crate::text::match_text;
use crate::value::{Captures, Value};
use tracing::trace;

/// Match two untyped values with the first representation both sides parse into.
///
/// Non-primitive pairs try JSON, then XML, then text. Primitive scalars and
/// nulls go straight to text.
pub fn match_value(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    if !expected.is_primitive() && !actual.is_primitive() {
        match match_json(message, expected, actual, conditions) {
            Err(MatchError::InvalidRepresentation(reason)) => {
                trace!(%reason, "values are not both JSON");
            }
            outcome => {
                trace!("matched as JSON");
                return outcome;
            }
        }
        match match_xml(message, expected, actual, conditions) {
            Err(MatchError::InvalidRepresentation(reason)) => {
                trace!(%reason, "values are not both XML");
            }
            outcome => {
                trace!("matched as XML");
                return outcome;
            }
        }
    }
    trace!("matching as text");
    match_text(message, expected, actual, conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use serde_json::json;

    fn ok(expected: Value, actual: Value) -> Captures {
        match_value(None, &expected, &actual, &Conditions::empty())
            .unwrap_or_else(|e| panic!("expected a match: {}", e))
    }

    fn fails(expected: Value, actual: Value) -> MatchError {
        match match_value(None, &expected, &actual, &Conditions::empty()) {
            Err(e) => e,
            Ok(c) => panic!("expected a mismatch, captured {:?}", c),
        }
    }

    #[test]
    fn test_json_text_is_matched_structurally() {
        let caps = ok(
            Value::from(r#"{"b":"~[b]"}"#),
            Value::from(r#"{"a":1,"b":"two"}"#),
        );
        assert_eq!(caps["b"], Value::from("two"));
        let err = fails(Value::from(r#"{"b":"x"}"#), Value::from(r#"{"b":"y"}"#));
        assert!(err.to_string().contains("JSONs do not match"));
    }

    #[test]
    fn test_xml_text_is_matched_structurally() {
        let caps = ok(
            Value::from("<a><b>~[b]</b></a>"),
            Value::from("<a><c/><b>text</b></a>"),
        );
        assert_eq!(caps["b"], Value::from("text"));
    }

    #[test]
    fn test_plain_text_falls_back() {
        assert!(ok(Value::from("some value"), Value::Json(json!("some value"))).is_empty());
        assert!(ok(Value::Json(json!("some value")), Value::from("some value")).is_empty());
        let err = fails(Value::from("some text"), Value::from("other text"));
        assert!(err.to_string().contains("Strings do not match"));
    }

    #[test]
    fn test_primitives_go_to_text() {
        assert!(ok(Value::from("2\\d\\d"), Value::Int(200)).is_empty());
        assert!(ok(Value::Float(200.0), Value::from("200.0")).is_empty());
        let caps = ok(Value::from("~[n]"), Value::Int(7));
        assert_eq!(caps["n"], Value::Int(7));
    }

    #[test]
    fn test_mixed_representations_do_not_cross() {
        // JSON on one side, XML on the other: neither tree applies, text decides
        fails(Value::from(r#"{"a":"1"}"#), Value::from("<a>1</a>"));
    }

    #[test]
    fn test_inversion_is_exclusive() {
        let cases = [
            (Value::from(r#"{"a":"1"}"#), Value::from(r#"{"a":"1"}"#)),
            (Value::from(r#"{"a":"1"}"#), Value::from(r#"{"a":"2"}"#)),
            (Value::from("<a>1</a>"), Value::from("<a>2</a>")),
            (Value::from("text"), Value::from("text")),
            (Value::Null, Value::Null),
            (Value::Null, Value::Int(1)),
        ];
        let inverted = Conditions::from([Condition::Invert]);
        for (expected, actual) in cases {
            let positive = match_value(None, &expected, &actual, &Conditions::empty()).is_ok();
            let negative = match_value(None, &expected, &actual, &inverted).is_ok();
            assert_ne!(positive, negative, "{:?} vs {:?}", expected, actual);
        }
    }
}
