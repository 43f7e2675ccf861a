//! JSON structural diff.
//!
//! Objects and arrays are open and arrays unordered unless [`JsonMode`] says
//! otherwise. Expected keys and string leaves may be negated with a leading `!`
//! (`\!` escapes it). `"!.*"` as a key or array element forbids anything
//! the expected side does not name.

use super::{
    closest_miss, search, Binding, Difference, ExplorationHistory, Frame, LeafMatcher, PassReport,
    TreeDiff,
};
use crate::placeholder;
use crate::value::{Captures, Value};
use serde_json::{Map, Value as Json};

/// Catch-all negation: no unmatched members allowed.
pub const NO_EXTRAS: &str = "!.*";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonMode {
    pub object_closed: bool,
    pub array_closed: bool,
    pub strict_order: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDiff {
    mode: JsonMode,
}

impl JsonDiff {
    pub fn new(mode: JsonMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> JsonMode {
        self.mode
    }
}

impl TreeDiff for JsonDiff {
    type Tree = Json;

    fn diff(
        &self,
        expected: &Json,
        actual: &Json,
        leaves: &dyn LeafMatcher,
        history: &ExplorationHistory,
    ) -> PassReport {
        let walk = Walk {
            mode: self.mode,
            leaves,
            history,
        };
        let mut frame = Frame::default();
        let outcome = walk.compare(expected, actual, "", "", &mut frame);
        frame.into_report(outcome)
    }
}

/// Append an RFC 6901 reference token to a pointer.
pub fn pointer(parent: &str, token: &str) -> String {
    let escaped = token.replace('~', "~0").replace('/', "~1");
    format!("{}/{}", parent, escaped)
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Split a leading `!` negation off a key or leaf; `\!` stays literal.
fn negation(pattern: &str) -> (bool, &str) {
    if let Some(rest) = pattern.strip_prefix('!') {
        (true, rest)
    } else if pattern.starts_with("\\!") {
        (false, &pattern[1..])
    } else {
        (false, pattern)
    }
}

/// How an actual JSON node is presented to the leaf hook.
fn leaf_value(actual: &Json) -> Value {
    match actual {
        Json::Null => Value::Null,
        Json::String(s) => Value::Text(s.clone()),
        Json::Object(_) | Json::Array(_) => Value::Json(actual.clone()),
        other => Value::Text(other.to_string()),
    }
}

struct Walk<'a> {
    mode: JsonMode,
    leaves: &'a dyn LeafMatcher,
    history: &'a ExplorationHistory,
}

impl Walk<'_> {
    fn compare(
        &self,
        expected: &Json,
        actual: &Json,
        ep: &str,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        match (expected, actual) {
            (Json::Object(e), Json::Object(a)) => self.objects(e, a, ep, ap, frame),
            (Json::Array(e), Json::Array(a)) => self.arrays(e, a, ep, ap, frame),
            (Json::String(pattern), _) => self.string_leaf(pattern, actual, ap, frame),
            (Json::Object(_), _) | (Json::Array(_), _) => Err(Difference::new(
                ap,
                format!("Expected {} but found {} {}", kind(expected), kind(actual), actual),
            )),
            _ => self.scalar(expected, actual, ap),
        }
    }

    fn leaf(&self, pattern: &str, actual: &Json) -> Option<Captures> {
        if matches!(actual, Json::Object(_) | Json::Array(_))
            && placeholder::standalone(pattern).is_none()
        {
            return None;
        }
        self.leaves.match_leaf(pattern, &leaf_value(actual))
    }

    fn string_leaf(
        &self,
        pattern: &str,
        actual: &Json,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        let (negated, pattern) = negation(pattern);
        match (negated, self.leaf(pattern, actual)) {
            (false, Some(captures)) => {
                frame.captures.extend(captures);
                Ok(())
            }
            (false, None) => Err(Difference::new(
                ap,
                format!("Expected value '{}' but got {}", pattern, actual),
            )),
            (true, Some(_)) => Err(Difference::new(
                ap,
                format!("Value {} should not match '{}'", actual, pattern),
            )),
            (true, None) => Ok(()),
        }
    }

    fn scalar(&self, expected: &Json, actual: &Json, ap: &str) -> Result<(), Difference> {
        let same = match (expected, actual) {
            (Json::Null, Json::Null) => true,
            (Json::Bool(e), Json::Bool(a)) => e == a,
            (Json::Number(e), Json::Number(a)) => {
                e.to_string() == a.to_string()
                    || matches!((e.as_f64(), a.as_f64()), (Some(x), Some(y)) if x == y)
            }
            _ => false,
        };
        if same {
            Ok(())
        } else {
            Err(Difference::new(
                ap,
                format!(
                    "Expected {} {} but got {} {}",
                    kind(expected),
                    expected,
                    kind(actual),
                    actual
                ),
            ))
        }
    }

    fn objects(
        &self,
        expected: &Map<String, Json>,
        actual: &Map<String, Json>,
        ep: &str,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        let entries: Vec<(&String, &Json)> = actual.iter().collect();
        let mut consumed = vec![false; entries.len()];
        let mut forbidden = Vec::new();
        let mut no_extras = false;

        for (key, value) in expected {
            if key == NO_EXTRAS {
                no_extras = true;
                continue;
            }
            let (negated, key_pattern) = negation(key);
            if negated {
                forbidden.push(key_pattern);
                continue;
            }

            let exp_path = pointer(ep, key);
            let mut named: Vec<(usize, Captures)> = Vec::new();
            for (i, (actual_key, _)) in entries.iter().enumerate() {
                if consumed[i] || self.history.excludes(&exp_path, &pointer(ap, actual_key)) {
                    continue;
                }
                if let Some(captures) = self
                    .leaves
                    .match_leaf(key_pattern, &Value::Text(actual_key.to_string()))
                {
                    named.push((i, captures));
                }
            }
            if named.is_empty() {
                return Err(Difference::new(
                    ap,
                    format!("Expected field '{}' was not found", key_pattern),
                ));
            }

            let indexes: Vec<usize> = (0..named.len()).collect();
            let chosen = search(&indexes, &mut frame.contested, |n, scratch| {
                let (i, key_captures) = &named[n];
                scratch.captures.extend(key_captures.clone());
                let (actual_key, actual_value) = entries[*i];
                self.compare(value, actual_value, &exp_path, &pointer(ap, actual_key), scratch)
            });
            match chosen {
                Ok(chosen) => {
                    let i = named[chosen.key].0;
                    consumed[i] = true;
                    if chosen.contested {
                        frame.contested.push(Binding {
                            expected: exp_path,
                            actual: pointer(ap, entries[i].0),
                        });
                    }
                    frame.absorb(chosen.frame);
                }
                Err(misses) => {
                    let what = format!("Field '{}'", key_pattern);
                    return Err(closest_miss(ap, misses, &what, named.len()));
                }
            }
        }

        for (i, (actual_key, _)) in entries.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            if no_extras || self.mode.object_closed {
                return Err(Difference::new(
                    pointer(ap, actual_key),
                    format!("Unexpected field '{}'", actual_key),
                ));
            }
            if let Some(pattern) = forbidden.iter().find(|pattern| {
                self.leaves
                    .match_leaf(pattern, &Value::Text(actual_key.to_string()))
                    .is_some()
            }) {
                return Err(Difference::new(
                    pointer(ap, actual_key),
                    format!("Field '{}' should not exist (matches '!{}')", actual_key, pattern),
                ));
            }
        }
        Ok(())
    }

    fn arrays(
        &self,
        expected: &[Json],
        actual: &[Json],
        ep: &str,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        let mut consumed = vec![false; actual.len()];
        let mut forbidden = Vec::new();
        let mut no_extras = false;
        let mut position = 0;

        for (index, element) in expected.iter().enumerate() {
            if let Json::String(s) = element {
                if s == NO_EXTRAS {
                    no_extras = true;
                    continue;
                }
                if let Some(pattern) = s.strip_prefix('!') {
                    forbidden.push(pattern);
                    continue;
                }
            }

            let exp_path = pointer(ep, &index.to_string());
            if self.mode.strict_order {
                let Some(candidate) = actual.get(position) else {
                    return Err(Difference::new(
                        ap,
                        format!(
                            "Expected an element at position {} but the array has {} element(s)",
                            position,
                            actual.len()
                        ),
                    ));
                };
                self.compare(
                    element,
                    candidate,
                    &exp_path,
                    &pointer(ap, &position.to_string()),
                    frame,
                )?;
                consumed[position] = true;
                position += 1;
                continue;
            }

            let candidates: Vec<usize> = (0..actual.len())
                .filter(|&i| {
                    !consumed[i] && !self.history.excludes(&exp_path, &pointer(ap, &i.to_string()))
                })
                .collect();
            let chosen = search(&candidates, &mut frame.contested, |i, scratch| {
                self.compare(element, &actual[i], &exp_path, &pointer(ap, &i.to_string()), scratch)
            });
            match chosen {
                Ok(chosen) => {
                    consumed[chosen.key] = true;
                    if chosen.contested {
                        frame.contested.push(Binding {
                            expected: exp_path,
                            actual: pointer(ap, &chosen.key.to_string()),
                        });
                    }
                    frame.absorb(chosen.frame);
                }
                Err(misses) => {
                    let what = format!("Expected element {}", element);
                    return Err(closest_miss(ap, misses, &what, candidates.len()));
                }
            }
        }

        for (i, element) in actual.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let at = pointer(ap, &i.to_string());
            if no_extras || self.mode.array_closed {
                return Err(Difference::new(at, format!("Unexpected element {}", element)));
            }
            for pattern in &forbidden {
                if self.leaf(pattern, element).is_some() {
                    return Err(Difference::new(
                        at,
                        format!("Element {} should not exist (matches '!{}')", element, pattern),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Paths of expected string leaves and keys that contain regex metacharacters.
pub fn regex_suspects(expected: &Json) -> Vec<String> {
    fn visit(node: &Json, path: &str, out: &mut Vec<String>) {
        match node {
            Json::Object(map) => {
                for (key, value) in map {
                    let child = pointer(path, key);
                    if has_metacharacters(key) {
                        out.push(child.clone());
                    }
                    visit(value, &child, out);
                }
            }
            Json::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    visit(item, &pointer(path, &i.to_string()), out);
                }
            }
            Json::String(s) if has_metacharacters(s) => out.push(path.to_string()),
            _ => {}
        }
    }
    let mut out = Vec::new();
    visit(expected, "", &mut out);
    out
}

/// True when text outside placeholders uses regex syntax.
pub(crate) fn has_metacharacters(text: &str) -> bool {
    let mut stripped = String::with_capacity(text.len());
    let mut cursor = 0;
    for p in placeholder::scan(text) {
        stripped.push_str(&text[cursor..p.span.start]);
        cursor = p.span.end;
    }
    stripped.push_str(&text[cursor..]);
    let body = stripped.strip_prefix('!').unwrap_or(&stripped);
    if body == ".*" {
        return false;
    }
    body.contains(|c: char| "\\^$.|?*+()[]{}".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Leaf hook with plain equality and standalone `~[name]` captures.
    struct Exact;

    impl LeafMatcher for Exact {
        fn match_leaf(&self, expected: &str, actual: &Value) -> Option<Captures> {
            let mut captures = Captures::new();
            if let Some(name) = placeholder::standalone(expected) {
                captures.insert(name.to_string(), actual.clone());
                return Some(captures);
            }
            (expected == actual.to_text()).then_some(captures)
        }
    }

    fn run(mode: JsonMode, expected: Json, actual: Json) -> PassReport {
        JsonDiff::new(mode).diff(&expected, &actual, &Exact, &ExplorationHistory::default())
    }

    fn open(expected: Json, actual: Json) -> PassReport {
        run(JsonMode::default(), expected, actual)
    }

    #[test]
    fn test_open_object_allows_extra_fields() {
        assert!(open(json!({"a": "x"}), json!({"a": "x", "b": "y"})).outcome.is_ok());
        let closed = JsonMode {
            object_closed: true,
            ..JsonMode::default()
        };
        let report = run(closed, json!({"a": "x"}), json!({"a": "x", "b": "y"}));
        assert_eq!(report.outcome.unwrap_err().path, "/b");
    }

    #[test]
    fn test_unordered_and_strict_arrays() {
        assert!(open(json!([1, 2]), json!([2, 1])).outcome.is_ok());
        let strict = JsonMode {
            strict_order: true,
            ..JsonMode::default()
        };
        assert!(run(strict, json!([1, 2]), json!([2, 1])).outcome.is_err());
        assert!(run(strict, json!([1, 2]), json!([1, 2, 3])).outcome.is_ok());
    }

    #[test]
    fn test_closed_array_rejects_extra_elements() {
        let closed = JsonMode {
            array_closed: true,
            ..JsonMode::default()
        };
        assert!(run(closed, json!([1, 2]), json!([2, 1])).outcome.is_ok());
        assert!(run(closed, json!([1, 2]), json!([2, 1, 3])).outcome.is_err());
    }

    #[test]
    fn test_negated_fields() {
        assert!(open(json!({"!b": "v", "a": "1"}), json!({"a": "1", "c": "v"})).outcome.is_ok());
        assert!(open(json!({"!b": "v", "a": "1"}), json!({"a": "1", "b": "v"})).outcome.is_err());
        assert!(open(json!({"a": "1", "!.*": ""}), json!({"a": "1"})).outcome.is_ok());
        assert!(open(json!({"a": "1", "!.*": ""}), json!({"a": "1", "z": 0})).outcome.is_err());
    }

    #[test]
    fn test_negated_array_elements() {
        assert!(open(json!([1, 2, "!.*"]), json!([2, 1])).outcome.is_ok());
        assert!(open(json!([1, 2, "!.*"]), json!([3, 2, 1])).outcome.is_err());
        assert!(open(json!(["a", "!b"]), json!(["a", "c"])).outcome.is_ok());
        assert!(open(json!(["a", "!b"]), json!(["b", "a"])).outcome.is_err());
    }

    #[test]
    fn test_negated_and_escaped_values() {
        assert!(open(json!({"a": "!x"}), json!({"a": "y"})).outcome.is_ok());
        assert!(open(json!({"a": "!x"}), json!({"a": "x"})).outcome.is_err());
        assert!(open(json!({"a": "\\!x"}), json!({"a": "!x"})).outcome.is_ok());
    }

    #[test]
    fn test_scalar_types_must_agree() {
        assert!(open(json!({"a": 1}), json!({"a": 1.0})).outcome.is_ok());
        assert!(open(json!({"a": true}), json!({"a": "true"})).outcome.is_err());
        assert!(open(json!({"a": null}), json!({"a": null})).outcome.is_ok());
        // string patterns compare against the text of any scalar
        assert!(open(json!({"a": "1"}), json!({"a": 1})).outcome.is_ok());
    }

    #[test]
    fn test_standalone_placeholder_captures_subtree() {
        let report = open(json!({"a": "~[doc]"}), json!({"a": {"b": [1]}}));
        assert!(report.outcome.is_ok());
        assert_eq!(report.captures["doc"], Value::Json(json!({"b": [1]})));
    }

    #[test]
    fn test_ambiguous_candidates_are_contested() {
        let report = open(json!({"~[k]": "1", "b": "2"}), json!({"a": "1", "b": "2", "c": "1"}));
        assert!(report.outcome.is_ok());
        assert_eq!(report.captures["k"], Value::from("a"));
        assert_eq!(report.contested.len(), 1);
        assert_eq!(report.contested[0].expected, "/~0[k]");
        assert_eq!(report.contested[0].actual, "/a");
    }

    #[test]
    fn test_failed_nested_pass_reports_contested_choice() {
        let report = open(
            json!({"x": {"~[k]": "~[v]", "a": "1"}}),
            json!({"x": {"a": "1", "b": "2"}}),
        );
        assert_eq!(report.outcome.unwrap_err().path, "/x");
        assert_eq!(
            report.contested,
            vec![super::Binding {
                expected: "/x/~0[k]".to_string(),
                actual: "/x/a".to_string(),
            }]
        );

        let report = open(json!([{"~[k]": "~[v]", "a": "1"}]), json!([{"a": "1", "b": "2"}]));
        assert!(report.outcome.is_err());
        assert_eq!(report.contested.len(), 1);
        assert_eq!(report.contested[0].expected, "/0/~0[k]");
        assert_eq!(report.contested[0].actual, "/0/a");
    }

    #[test]
    fn test_history_excludes_binding() {
        let expected = json!({"~[k]": "1"});
        let actual = json!({"a": "1", "c": "1"});
        let (history, _) = ExplorationHistory::default().extended(vec![super::Binding {
            expected: "/~0[k]".to_string(),
            actual: "/a".to_string(),
        }]);
        let report = JsonDiff::default().diff(&expected, &actual, &Exact, &history);
        assert_eq!(report.captures["k"], Value::from("c"));
        assert!(report.contested.is_empty());
    }

    #[test]
    fn test_each_pairing_compared_once_per_pass() {
        struct Counting(std::cell::Cell<usize>);

        impl LeafMatcher for Counting {
            fn match_leaf(&self, expected: &str, actual: &Value) -> Option<Captures> {
                self.0.set(self.0.get() + 1);
                Exact.match_leaf(expected, actual)
            }
        }

        let leaves = Counting(std::cell::Cell::new(0));
        let report = JsonDiff::default().diff(
            &json!([["a"], ["b"]]),
            &json!([["b"], ["a"]]),
            &leaves,
            &ExplorationHistory::default(),
        );
        assert!(report.outcome.is_ok());
        // ["a"] tries both candidates, ["b"] only the one left
        assert_eq!(leaves.0.get(), 3);
    }

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(pointer("", "a/b"), "/a~1b");
        assert_eq!(pointer("/x", "~"), "/x/~0");
    }

    #[test]
    fn test_regex_suspects() {
        let suspects = regex_suspects(&json!({"a": "1.5", "b": "~[x]", "c": ["(x)"], "!.*": ""}));
        assert_eq!(suspects, vec!["/a".to_string(), "/c/0".to_string()]);
    }
}
