//! Behavior flags consulted by every matcher.
//!
//! A [`Conditions`] set is immutable: narrowing it for a sub-match (for example
//! stripping array flags before comparing response headers) produces a new set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single matching flag. Absence of a flag means the permissive default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    /// Succeed when the values do not match, fail when they do
    Invert,
    /// JSON objects may not carry fields the expected object does not name
    ObjectClosed,
    /// JSON arrays may not carry elements the expected array does not name
    ArrayClosed,
    /// JSON array elements are compared by position
    ArrayStrictOrder,
    /// Expected text is never interpreted as a regular expression
    RegexDisabled,
    /// XML elements must have the same number of child nodes
    XmlChildCount,
    /// XML child elements are compared by position
    XmlChildSequence,
    /// XML elements must carry the same number of attributes
    XmlAttributeCount,
    /// Invert the status comparison of a response match
    NotStatus,
    /// Invert the reason phrase comparison of a response match
    NotReason,
    /// Invert the headers comparison of a response match
    NotHeaders,
    /// Invert the body comparison of a response match
    NotBody,
}

impl Condition {
    pub const ALL: [Condition; 12] = [
        Condition::Invert,
        Condition::ObjectClosed,
        Condition::ArrayClosed,
        Condition::ArrayStrictOrder,
        Condition::RegexDisabled,
        Condition::XmlChildCount,
        Condition::XmlChildSequence,
        Condition::XmlAttributeCount,
        Condition::NotStatus,
        Condition::NotReason,
        Condition::NotHeaders,
        Condition::NotBody,
    ];

    /// Flags that only mean something to the response matcher.
    pub const RESPONSE_SCOPED: [Condition; 4] = [
        Condition::NotStatus,
        Condition::NotReason,
        Condition::NotHeaders,
        Condition::NotBody,
    ];

    /// Flags shaping JSON structure comparison.
    pub const JSON_STRUCTURE: [Condition; 3] = [
        Condition::ObjectClosed,
        Condition::ArrayClosed,
        Condition::ArrayStrictOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Invert => "invert",
            Condition::ObjectClosed => "object-closed",
            Condition::ArrayClosed => "array-closed",
            Condition::ArrayStrictOrder => "array-strict-order",
            Condition::RegexDisabled => "regex-disabled",
            Condition::XmlChildCount => "xml-child-count",
            Condition::XmlChildSequence => "xml-child-sequence",
            Condition::XmlAttributeCount => "xml-attribute-count",
            Condition::NotStatus => "not-status",
            Condition::NotReason => "not-reason",
            Condition::NotHeaders => "not-headers",
            Condition::NotBody => "not-body",
        }
    }

    pub fn is_response_scoped(&self) -> bool {
        Self::RESPONSE_SCOPED.contains(self)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Condition::ALL
            .iter()
            .find(|c| c.as_str() == wanted)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Condition::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown condition '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// An immutable set of [`Condition`] flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(BTreeSet<Condition>);

impl Conditions {
    pub fn new<I: IntoIterator<Item = Condition>>(conditions: I) -> Self {
        Self(conditions.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, condition: Condition) -> bool {
        self.0.contains(&condition)
    }

    /// A copy of this set with `condition` added.
    pub fn with(&self, condition: Condition) -> Self {
        let mut set = self.0.clone();
        set.insert(condition);
        Self(set)
    }

    /// A copy of this set without any of `removed`.
    pub fn without(&self, removed: &[Condition]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|c| !removed.contains(c))
                .copied()
                .collect(),
        )
    }

    /// Set difference: the flags of `self` that are not in `other`.
    pub fn difference(&self, other: &Conditions) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Condition> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<const N: usize> From<[Condition; N]> for Conditions {
    fn from(conditions: [Condition; N]) -> Self {
        Self::new(conditions)
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
