//! Owned XML model and its structural diff.
//!
//! Documents are parsed with `sxd-document` and copied into [`XmlElement`]s.
//! Comments, processing instructions, whitespace-only text and namespace
//! declarations are dropped; names are compared by local part.

use super::{
    closest_miss, search, Binding, Difference, ExplorationHistory, Frame, LeafMatcher, PassReport,
    TreeDiff,
};
use crate::error::MatchError;
use crate::value::Value;
use std::fmt;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// An element with its attributes, trimmed text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, MatchError> {
        let package = parser::parse(xml).map_err(|e| {
            MatchError::InvalidRepresentation(format!("malformed XML: {:?}", e))
        })?;
        let document = package.as_document();
        let root = document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(element) => Some(element),
                _ => None,
            })
            .ok_or_else(|| {
                MatchError::InvalidRepresentation("XML document has no root element".to_string())
            })?;
        Ok(convert(root))
    }
}

fn convert(element: Element<'_>) -> XmlElement {
    let attributes = element
        .attributes()
        .into_iter()
        .filter(|attr| {
            let name = attr.name();
            name.namespace_uri() != Some(XMLNS_URI) && name.local_part() != "xmlns"
        })
        .map(|attr| (attr.name().local_part().to_string(), attr.value().to_string()))
        .collect();

    // Entity references split text into several nodes; trim only the joined whole
    let mut raw = String::new();
    let mut children = Vec::new();
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => children.push(convert(e)),
            ChildOfElement::Text(t) => raw.push_str(t.text()),
            _ => {}
        }
    }
    let text = raw.trim().to_string();

    XmlElement {
        name: element.name().local_part().to_string(),
        attributes,
        text,
        children,
    }
}

fn escape(text: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            c => write!(out, "{}", c)?,
        }
    }
    Ok(())
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (name, value) in &self.attributes {
            write!(f, " {}=\"", name)?;
            escape(value, f)?;
            f.write_str("\"")?;
        }
        if self.text.is_empty() && self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        escape(&self.text, f)?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmlMode {
    pub child_count: bool,
    pub child_sequence: bool,
    pub attribute_count: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDiff {
    mode: XmlMode,
}

impl XmlDiff {
    pub fn new(mode: XmlMode) -> Self {
        Self { mode }
    }
}

impl TreeDiff for XmlDiff {
    type Tree = XmlElement;

    fn diff(
        &self,
        expected: &XmlElement,
        actual: &XmlElement,
        leaves: &dyn LeafMatcher,
        history: &ExplorationHistory,
    ) -> PassReport {
        let walk = Walk {
            mode: self.mode,
            leaves,
            history,
        };
        let mut frame = Frame::default();
        let ep = step("", &expected.name, 1);
        let ap = step("", &actual.name, 1);
        let outcome = walk.compare(expected, actual, &ep, &ap, &mut frame);
        frame.into_report(outcome)
    }
}

/// XPath-like step: `/parent/name[n]`, `n` counted among same-named siblings.
fn step(parent: &str, name: &str, nth: usize) -> String {
    format!("{}/{}[{}]", parent, name, nth)
}

fn nth_of_name(siblings: &[XmlElement], index: usize) -> usize {
    let name = &siblings[index].name;
    siblings[..index].iter().filter(|s| &s.name == name).count() + 1
}

struct Walk<'a> {
    mode: XmlMode,
    leaves: &'a dyn LeafMatcher,
    history: &'a ExplorationHistory,
}

impl Walk<'_> {
    fn compare(
        &self,
        expected: &XmlElement,
        actual: &XmlElement,
        ep: &str,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        if expected.name != actual.name {
            return Err(Difference::new(
                ap,
                format!(
                    "Expected element <{}> but found <{}>",
                    expected.name, actual.name
                ),
            ));
        }

        if self.mode.attribute_count && expected.attributes.len() != actual.attributes.len() {
            return Err(Difference::new(
                ap,
                format!(
                    "Expected {} attribute(s) but found {}",
                    expected.attributes.len(),
                    actual.attributes.len()
                ),
            ));
        }
        for (name, pattern) in &expected.attributes {
            let at = format!("{}/@{}", ap, name);
            let value = actual.attribute(name).ok_or_else(|| {
                Difference::new(&at, format!("Expected attribute '{}' is missing", name))
            })?;
            let captures = self
                .leaves
                .match_leaf(pattern, &Value::Text(value.to_string()))
                .ok_or_else(|| {
                    Difference::new(
                        &at,
                        format!("Expected attribute value '{}' but got '{}'", pattern, value),
                    )
                })?;
            frame.captures.extend(captures);
        }

        let at = format!("{}/text()", ap);
        if !expected.text.is_empty() {
            let captures = self
                .leaves
                .match_leaf(&expected.text, &Value::Text(actual.text.clone()))
                .ok_or_else(|| {
                    Difference::new(
                        &at,
                        format!(
                            "Expected text '{}' but got '{}'",
                            expected.text, actual.text
                        ),
                    )
                })?;
            frame.captures.extend(captures);
        } else if self.mode.child_count && !actual.text.is_empty() {
            return Err(Difference::new(
                at,
                format!("Unexpected text '{}'", actual.text),
            ));
        }

        if self.mode.child_count && expected.children.len() != actual.children.len() {
            return Err(Difference::new(
                ap,
                format!(
                    "Expected {} child element(s) but found {}",
                    expected.children.len(),
                    actual.children.len()
                ),
            ));
        }

        if self.mode.child_sequence {
            return self.sequence(expected, actual, ep, ap, frame);
        }

        let mut consumed = vec![false; actual.children.len()];
        for (index, child) in expected.children.iter().enumerate() {
            let exp_path = step(ep, &child.name, nth_of_name(&expected.children, index));
            let paths: Vec<String> = (0..actual.children.len())
                .map(|i| step(ap, &actual.children[i].name, nth_of_name(&actual.children, i)))
                .collect();
            let candidates: Vec<usize> = (0..actual.children.len())
                .filter(|&i| {
                    !consumed[i]
                        && actual.children[i].name == child.name
                        && !self.history.excludes(&exp_path, &paths[i])
                })
                .collect();
            if candidates.is_empty() {
                return Err(Difference::new(
                    ap,
                    format!(
                        "Expected element {} doesn't match any actual element",
                        exp_path
                    ),
                ));
            }
            let chosen = search(&candidates, &mut frame.contested, |i, scratch| {
                self.compare(child, &actual.children[i], &exp_path, &paths[i], scratch)
            });
            match chosen {
                Ok(chosen) => {
                    consumed[chosen.key] = true;
                    if chosen.contested {
                        frame.contested.push(Binding {
                            expected: exp_path,
                            actual: paths[chosen.key].clone(),
                        });
                    }
                    frame.absorb(chosen.frame);
                }
                Err(misses) => {
                    let what = format!("Expected element {}", exp_path);
                    return Err(closest_miss(ap, misses, &what, candidates.len()));
                }
            }
        }
        Ok(())
    }

    fn sequence(
        &self,
        expected: &XmlElement,
        actual: &XmlElement,
        ep: &str,
        ap: &str,
        frame: &mut Frame,
    ) -> Result<(), Difference> {
        for (index, child) in expected.children.iter().enumerate() {
            let exp_path = step(ep, &child.name, nth_of_name(&expected.children, index));
            let Some(candidate) = actual.children.get(index) else {
                return Err(Difference::new(
                    ap,
                    format!(
                        "Expected element {} at position {} but there are only {} child element(s)",
                        exp_path,
                        index + 1,
                        actual.children.len()
                    ),
                ));
            };
            let act_path = step(ap, &candidate.name, nth_of_name(&actual.children, index));
            self.compare(child, candidate, &exp_path, &act_path, frame)?;
        }
        Ok(())
    }
}

/// Paths of expected attribute values and texts containing regex metacharacters.
pub fn regex_suspects(expected: &XmlElement) -> Vec<String> {
    fn visit(element: &XmlElement, path: &str, out: &mut Vec<String>) {
        for (name, value) in &element.attributes {
            if super::json::has_metacharacters(value) {
                out.push(format!("{}/@{}", path, name));
            }
        }
        if super::json::has_metacharacters(&element.text) {
            out.push(format!("{}/text()", path));
        }
        for (i, child) in element.children.iter().enumerate() {
            visit(child, &step(path, &child.name, nth_of_name(&element.children, i)), out);
        }
    }
    let mut out = Vec::new();
    visit(expected, &step("", &expected.name, 1), &mut out);
    out
}
