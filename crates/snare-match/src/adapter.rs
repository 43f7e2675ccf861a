//! JSON and XML matching on top of the structural diff engines.
//!
//! The adapter converts values into trees, maps the condition set onto engine
//! modes and plugs the text matcher in as the leaf hook. A pass that fails
//! after contested choices is retried with those choices excluded, until a pass
//! succeeds or a failed pass proposes nothing new.

use crate::condition::{Condition, Conditions};
use crate::error::{invert, labelled, MatchError, REGEX_HINT};
use crate::pattern::TextPattern;
use crate::placeholder;
use crate::text::TextMatcher;
use crate::tree::json::{self, JsonDiff, JsonMode};
use crate::tree::xml::{self, XmlDiff, XmlElement, XmlMode};
use crate::tree::{Difference, ExplorationHistory, LeafMatcher, TreeDiff};
use crate::value::{Captures, Value};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Leaf hook backed by the text matcher, compiling each distinct pattern once.
pub struct PatternLeaves {
    matcher: TextMatcher,
    compiled: RefCell<HashMap<String, Rc<TextPattern>>>,
}

impl PatternLeaves {
    pub fn new(matcher: TextMatcher) -> Self {
        Self {
            matcher,
            compiled: RefCell::new(HashMap::new()),
        }
    }

    fn pattern(&self, expected: &str) -> Rc<TextPattern> {
        let mut compiled = self.compiled.borrow_mut();
        if let Some(pattern) = compiled.get(expected) {
            return Rc::clone(pattern);
        }
        let pattern = Rc::new(TextPattern::compile(expected, self.matcher.regex_enabled()));
        compiled.insert(expected.to_string(), Rc::clone(&pattern));
        pattern
    }
}

impl LeafMatcher for PatternLeaves {
    fn match_leaf(&self, expected: &str, actual: &Value) -> Option<Captures> {
        if let Some(name) = placeholder::standalone(expected) {
            let mut captures = Captures::new();
            captures.insert(name.to_string(), actual.clone());
            return Some(captures);
        }
        self.pattern(expected).captures(&actual.to_text())
    }
}

/// Run `diff` until a pass succeeds or the exploration history stops growing.
pub fn resolve<D: TreeDiff>(
    diff: &D,
    expected: &D::Tree,
    actual: &D::Tree,
    leaves: &dyn LeafMatcher,
) -> Result<Captures, Difference> {
    let mut history = ExplorationHistory::default();
    let mut pass = 1u32;
    loop {
        let report = diff.diff(expected, actual, leaves, &history);
        let difference = match report.outcome {
            Ok(()) => {
                if pass > 1 {
                    debug!(pass, "structural comparison resolved after backtracking");
                }
                return Ok(report.captures);
            }
            Err(difference) => difference,
        };
        let (extended, fresh) = history.extended(report.contested);
        if fresh == 0 {
            return Err(difference);
        }
        debug!(
            pass,
            fresh,
            explored = extended.len(),
            %difference,
            "retrying structural comparison without contested bindings"
        );
        history = extended;
        pass += 1;
    }
}

/// Both sides null is a match, exactly one null side a mismatch.
fn null_sides(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    what: &str,
) -> Option<Result<Captures, MatchError>> {
    match (expected.is_null(), actual.is_null()) {
        (true, true) => Some(Ok(Captures::new())),
        (false, false) => None,
        (expected_null, _) => {
            let body = if expected_null {
                format!("{}s do not match\nExpected null, but actual value is not null", what)
            } else {
                format!("{}s do not match\nExpected value is not null, but actual value is null", what)
            };
            Some(Err(MatchError::mismatch(
                labelled(message, &body),
                expected.to_text(),
                actual.to_text(),
            )))
        }
    }
}

fn hint(conditions: &Conditions) -> &'static str {
    if conditions.contains(Condition::RegexDisabled) {
        ""
    } else {
        REGEX_HINT
    }
}

/// Read a value as a JSON tree.
pub fn to_json(value: &Value) -> Result<Json, MatchError> {
    match value {
        Value::Json(json) => Ok(json.clone()),
        Value::Text(text) => match serde_json::from_str::<Json>(text) {
            Ok(json @ (Json::Object(_) | Json::Array(_))) => Ok(json),
            Ok(_) => Err(MatchError::InvalidRepresentation(
                "JSON text is not an object or an array".to_string(),
            )),
            Err(e) => Err(MatchError::InvalidRepresentation(format!(
                "malformed JSON: {}",
                e
            ))),
        },
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::from(*i)),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| MatchError::InvalidRepresentation(format!("{} is not a JSON number", f))),
        Value::Null => Ok(Json::Null),
        Value::Xml(_) => Err(MatchError::InvalidRepresentation(
            "an XML document has no JSON representation".to_string(),
        )),
    }
}

/// Read a value as an XML tree.
pub fn to_xml(value: &Value) -> Result<XmlElement, MatchError> {
    match value {
        Value::Xml(element) => Ok(element.clone()),
        Value::Text(text) => XmlElement::parse(text),
        Value::Json(Json::String(text)) => XmlElement::parse(text),
        other => Err(MatchError::InvalidRepresentation(format!(
            "a {} value has no XML representation",
            other.kind()
        ))),
    }
}

fn pretty(json: &Json) -> String {
    serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
}

/// Match two values as JSON trees.
pub fn match_json(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    let outcome = json_positive(message, expected, actual, conditions);
    if conditions.contains(Condition::Invert) {
        invert(outcome, || {
            let body = format!("JSONs match!\n{}", hint(conditions));
            MatchError::mismatch(labelled(message, &body), expected.to_text(), actual.to_text())
        })
    } else {
        outcome
    }
}

fn json_positive(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    if let Some(outcome) = null_sides(message, expected, actual, "JSON") {
        return outcome;
    }
    let expected_tree = to_json(expected)?;
    let actual_tree = to_json(actual)?;

    let mode = JsonMode {
        object_closed: conditions.contains(Condition::ObjectClosed),
        array_closed: conditions.contains(Condition::ArrayClosed),
        strict_order: conditions.contains(Condition::ArrayStrictOrder),
    };
    let leaves = PatternLeaves::new(TextMatcher::new(conditions));
    resolve(&JsonDiff::new(mode), &expected_tree, &actual_tree, &leaves).map_err(|difference| {
        if !conditions.contains(Condition::RegexDisabled) {
            let suspects = json::regex_suspects(&expected_tree);
            if !suspects.is_empty() {
                debug!(?suspects, "expected JSON has leaves that are read as regular expressions");
            }
        }
        let body = format!(
            "{}\nJSONs do not match\n{}\n\nExpected:\n{}\n\nBut got:\n{}",
            difference,
            hint(conditions),
            pretty(&expected_tree),
            pretty(&actual_tree)
        );
        MatchError::mismatch(
            labelled(message, &body),
            expected_tree.to_string(),
            actual_tree.to_string(),
        )
    })
}

/// Match two values as XML trees.
pub fn match_xml(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    let outcome = xml_positive(message, expected, actual, conditions);
    if conditions.contains(Condition::Invert) {
        invert(outcome, || {
            let body = format!("XMLs match!\n{}", hint(conditions));
            MatchError::mismatch(labelled(message, &body), expected.to_text(), actual.to_text())
        })
    } else {
        outcome
    }
}

fn xml_positive(
    message: Option<&str>,
    expected: &Value,
    actual: &Value,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    if let Some(outcome) = null_sides(message, expected, actual, "XML") {
        return outcome;
    }
    let expected_tree = to_xml(expected)?;
    let actual_tree = to_xml(actual)?;

    let mode = XmlMode {
        child_count: conditions.contains(Condition::XmlChildCount),
        child_sequence: conditions.contains(Condition::XmlChildSequence),
        attribute_count: conditions.contains(Condition::XmlAttributeCount),
    };
    let leaves = PatternLeaves::new(TextMatcher::new(conditions));
    resolve(&XmlDiff::new(mode), &expected_tree, &actual_tree, &leaves).map_err(|difference| {
        if !conditions.contains(Condition::RegexDisabled) {
            let suspects = xml::regex_suspects(&expected_tree);
            if !suspects.is_empty() {
                debug!(?suspects, "expected XML has values that are read as regular expressions");
            }
        }
        let body = format!(
            "{}\nXMLs do not match\n{}\n\nExpected:\n{}\n\nBut got:\n{}",
            difference,
            hint(conditions),
            expected_tree,
            actual_tree
        );
        MatchError::mismatch(
            labelled(message, &body),
            expected_tree.to_string(),
            actual_tree.to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    fn conditions(flags: &[Condition]) -> Conditions {
        flags.iter().copied().collect()
    }

    fn json_ok(expected: &str, actual: &str, flags: &[Condition]) -> Captures {
        match_json(None, &expected.into(), &actual.into(), &conditions(flags))
            .unwrap_or_else(|e| panic!("expected a match: {}", e))
    }

    fn json_fails(expected: &str, actual: &str, flags: &[Condition]) -> MatchError {
        match match_json(None, &expected.into(), &actual.into(), &conditions(flags)) {
            Err(e) => e,
            Ok(captures) => panic!("expected a mismatch, captured {:?}", captures),
        }
    }

    #[test]
    fn test_open_and_closed_objects() {
        assert!(json_ok(r#"{"a":"x"}"#, r#"{"a":"x","b":"y"}"#, &[]).is_empty());
        let err = json_fails(r#"{"a":"x"}"#, r#"{"a":"x","b":"y"}"#, &[Condition::ObjectClosed]);
        assert!(err.to_string().contains("JSONs do not match"));
    }

    #[test]
    fn test_array_order() {
        json_ok(r#"{"a":[1,2]}"#, r#"{"a":[2,1]}"#, &[]);
        json_fails(r#"{"a":[1,2]}"#, r#"{"a":[2,1]}"#, &[Condition::ArrayStrictOrder]);
    }

    #[test]
    fn test_nested_constraint_selects_candidate() {
        let caps = json_ok(
            r#"{"abc-~[sym]":{"o":"0"}}"#,
            r#"{"abc-X":{"o":"1"},"abc-Y":{"o":"0"}}"#,
            &[],
        );
        assert_eq!(caps["sym"], Value::from("Y"));
    }

    #[test]
    #[traced_test]
    fn test_backtracking_resolves_greedy_choice() {
        let caps = json_ok(r#"{"~[k]":".*","a":"1"}"#, r#"{"a":"1","b":"2"}"#, &[]);
        assert_eq!(caps["k"], Value::from("b"));
        assert!(logs_contain("retrying structural comparison"));
    }

    #[test]
    fn test_backtracking_in_arrays() {
        let caps = json_ok(
            r#"[{"id":"~[first]"},{"id":"1","tag":"x"}]"#,
            r#"[{"id":"1","tag":"x"},{"id":"2"}]"#,
            &[],
        );
        assert_eq!(caps["first"], Value::from("2"));
    }

    #[test]
    fn test_backtracking_below_the_root() {
        let caps = json_ok(r#"{"x":{"~[k]":".*","a":"1"}}"#, r#"{"x":{"a":"1","b":"2"}}"#, &[]);
        assert_eq!(caps["k"], Value::from("b"));

        let caps = json_ok(r#"[{"~[k]":".*","a":"1"}]"#, r#"[{"a":"1","b":"2"}]"#, &[]);
        assert_eq!(caps["k"], Value::from("b"));

        let caps = json_ok(
            r#"{"outer":[{"inner":{"~[k]":".*","a":"1"}}]}"#,
            r#"{"outer":[{"inner":{"a":"1","b":"2"}}]}"#,
            &[],
        );
        assert_eq!(caps["k"], Value::from("b"));
    }

    #[test]
    fn test_xml_backtracking_below_the_root() {
        let caps = match_xml(
            None,
            &"<r><g><v>~[first]</v><v>a</v></g></r>".into(),
            &"<r><g><v>a</v><v>b</v></g></r>".into(),
            &Conditions::empty(),
        )
        .unwrap();
        assert_eq!(caps["first"], Value::from("b"));
    }

    #[test]
    fn test_exhausted_backtracking_reports_mismatch() {
        let err = json_fails(r#"{"~[k]":"1","a":"2"}"#, r#"{"a":"1","b":"1"}"#, &[]);
        assert!(err.is_mismatch());
        assert!(err.to_string().contains("Expected:"));
    }

    #[test]
    fn test_value_captures_are_text() {
        let caps = json_ok(
            r#"[1,"~[sym1]",3]"#,
            r#"[3,1,5]"#,
            &[],
        );
        assert_eq!(caps["sym1"], Value::from("5"));
    }

    #[test]
    fn test_invalid_representations() {
        let err = match_json(None, &"plain".into(), &"{}".into(), &Conditions::empty()).unwrap_err();
        assert!(err.is_invalid_representation());
        let err = match_json(None, &"{} trailing".into(), &"{}".into(), &Conditions::empty())
            .unwrap_err();
        assert!(err.is_invalid_representation());
        let err = match_json(None, &"200".into(), &"200".into(), &Conditions::empty()).unwrap_err();
        assert!(err.is_invalid_representation());
        // inversion never hides a representation problem
        let err = match_json(None, &"plain".into(), &"{}".into(), &conditions(&[Condition::Invert]))
            .unwrap_err();
        assert!(err.is_invalid_representation());
    }

    #[test]
    fn test_json_values_pass_through() {
        let caps = match_json(
            None,
            &Value::Json(json!({"n": "~[n]"})),
            &Value::Json(json!({"n": 1000})),
            &Conditions::empty(),
        )
        .unwrap();
        assert_eq!(caps["n"], Value::from("1000"));
        let caps = match_json(None, &Value::Int(1000), &Value::Int(1000), &Conditions::empty());
        assert!(caps.is_ok());
    }

    #[test]
    fn test_json_inversion() {
        let invert = [Condition::Invert];
        assert!(json_ok(r#"{"a":"1"}"#, r#"{"a":"2"}"#, &invert).is_empty());
        let err = json_fails(r#"{"a":"1"}"#, r#"{"a":"1"}"#, &invert);
        assert!(err.to_string().starts_with("JSONs match!"));
    }

    #[test]
    fn test_null_sides() {
        assert!(match_json(None, &Value::Null, &Value::Null, &Conditions::empty()).is_ok());
        assert!(match_json(None, &"{}".into(), &Value::Null, &Conditions::empty())
            .unwrap_err()
            .is_mismatch());
    }

    #[test]
    fn test_regex_disabled_in_leaves() {
        json_ok(r#"{"a":"1.5"}"#, r#"{"a":"105"}"#, &[]);
        json_fails(r#"{"a":"1.5"}"#, r#"{"a":"105"}"#, &[Condition::RegexDisabled]);
    }

    #[test]
    fn test_xml_matching() {
        let caps = match_xml(
            Some("xml"),
            &r#"<a id="~[id]"><lorem>~[word]</lorem></a>"#.into(),
            &r#"<a id="1"> <lorem>ipsum</lorem> </a>"#.into(),
            &Conditions::empty(),
        )
        .unwrap();
        assert_eq!(caps["id"], Value::from("1"));
        assert_eq!(caps["word"], Value::from("ipsum"));

        let err = match_xml(
            Some("xml"),
            &r#"<a id="1"/>"#.into(),
            &r#"<a id="2"/>"#.into(),
            &Conditions::empty(),
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("xml\n"));
        assert!(text.contains("XMLs do not match"));
    }

    #[test]
    fn test_xml_text_with_entities() {
        let caps = match_xml(
            None,
            &"<note>~[body]</note>".into(),
            &"<note>\n  fish &amp; chips  \n</note>".into(),
            &Conditions::empty(),
        )
        .unwrap();
        assert_eq!(caps["body"], Value::from("fish & chips"));

        let outcome = match_xml(
            None,
            &"<note>fish &amp; chips</note>".into(),
            &"<note>fish&amp;chips</note>".into(),
            &Conditions::empty(),
        );
        assert!(outcome.unwrap_err().is_mismatch());
    }

    #[test]
    fn test_xml_sequence_inverted() {
        let flags = conditions(&[Condition::XmlChildSequence, Condition::Invert]);
        let outcome = match_xml(
            None,
            &"<l><i>3</i><i>0</i></l>".into(),
            &"<l><i>0</i><i>3</i></l>".into(),
            &flags,
        );
        assert!(outcome.unwrap().is_empty());
    }

    #[test]
    fn test_xml_rejects_json_values() {
        let err = match_xml(None, &Value::Json(json!({})), &"<a/>".into(), &Conditions::empty())
            .unwrap_err();
        assert!(err.is_invalid_representation());
        let err = match_xml(None, &"<int a=2>".into(), &"<a/>".into(), &Conditions::empty())
            .unwrap_err();
        assert!(err.is_invalid_representation());
    }
}
