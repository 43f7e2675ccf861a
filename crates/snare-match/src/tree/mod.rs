//! Structural diff engines for JSON and XML trees.
//!
//! An engine walks an expected and an actual tree under configurable
//! closedness/order modes. It never interprets leaf text itself: every scalar
//! and field name goes through a [`LeafMatcher`] supplied by the caller.
//!
//! When an expected member has more than one fully matching actual candidate
//! the first one is taken and the choice is reported as *contested*. Callers
//! can rerun a failed pass with an [`ExplorationHistory`] that excludes those
//! choices.

pub mod json;
pub mod xml;

use crate::value::{Captures, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Leaf comparison hook.
pub trait LeafMatcher {
    /// Match one expected leaf pattern against an actual value.
    fn match_leaf(&self, expected: &str, actual: &Value) -> Option<Captures>;
}

/// An expected node bound to an actual node, both identified by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", display_path(&self.expected), display_path(&self.actual))
    }
}

/// Bindings already tried and rejected during one match invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplorationHistory {
    tried: BTreeSet<Binding>,
}

impl ExplorationHistory {
    pub fn excludes(&self, expected: &str, actual: &str) -> bool {
        // BTreeSet lookups need an owned key; most histories are empty.
        !self.tried.is_empty()
            && self.tried.contains(&Binding {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
    }

    /// A new history including `bindings`, and how many of them were not tried before.
    pub fn extended(mut self, bindings: impl IntoIterator<Item = Binding>) -> (Self, usize) {
        let before = self.tried.len();
        self.tried.extend(bindings);
        let fresh = self.tried.len() - before;
        (self, fresh)
    }

    pub fn len(&self) -> usize {
        self.tried.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tried.is_empty()
    }
}

/// Where and why two trees differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub path: String,
    pub reason: String,
}

impl Difference {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.reason, display_path(&self.path))
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Result of one structural comparison pass.
#[derive(Debug)]
pub struct PassReport {
    pub outcome: Result<(), Difference>,
    pub captures: Captures,
    /// Choices made among several fully matching candidates.
    pub contested: Vec<Binding>,
}

/// A structural diff engine.
pub trait TreeDiff {
    type Tree;

    fn diff(
        &self,
        expected: &Self::Tree,
        actual: &Self::Tree,
        leaves: &dyn LeafMatcher,
        history: &ExplorationHistory,
    ) -> PassReport;
}

/// Scratch state for one candidate attempt. Its captures reach the parent only when chosen.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    pub captures: Captures,
    pub contested: Vec<Binding>,
}

impl Frame {
    pub fn absorb(&mut self, other: Frame) {
        self.captures.extend(other.captures);
        self.contested.extend(other.contested);
    }

    pub fn into_report(self, outcome: Result<(), Difference>) -> PassReport {
        PassReport {
            outcome,
            captures: self.captures,
            contested: self.contested,
        }
    }
}

pub(crate) struct Chosen<K> {
    pub key: K,
    pub frame: Frame,
    pub contested: bool,
}

/// Try `candidates` in order and keep the first that matches.
///
/// Stops at the second success: that is enough to know the choice is contested.
/// On failure returns the difference of every attempt. Choices contested inside
/// a failed attempt go to `contested` either way, so a failed pass can be rerun
/// without them however deep they were made.
pub(crate) fn search<K: Copy>(
    candidates: &[K],
    contested: &mut Vec<Binding>,
    mut attempt: impl FnMut(K, &mut Frame) -> Result<(), Difference>,
) -> Result<Chosen<K>, Vec<Difference>> {
    let mut chosen: Option<Chosen<K>> = None;
    let mut misses = Vec::new();
    for &key in candidates {
        let mut frame = Frame::default();
        match attempt(key, &mut frame) {
            Ok(()) => match chosen.as_mut() {
                Some(first) => {
                    first.contested = true;
                    break;
                }
                None => {
                    chosen = Some(Chosen {
                        key,
                        frame,
                        contested: false,
                    })
                }
            },
            Err(difference) => {
                contested.append(&mut frame.contested);
                misses.push(difference);
            }
        }
    }
    chosen.ok_or(misses)
}

/// Pick the most useful difference to report when no candidate matched.
pub(crate) fn closest_miss(
    path: &str,
    mut misses: Vec<Difference>,
    what: &str,
    total: usize,
) -> Difference {
    if misses.len() == 1 {
        return misses.remove(0);
    }
    let deepest = misses.into_iter().max_by_key(|d| d.path.len());
    match deepest {
        Some(d) => Difference::new(
            path,
            format!(
                "{} did not match any of {} candidates; closest miss: {}",
                what, total, d
            ),
        ),
        None => Difference::new(path, format!("{} has no candidate to match", what)),
    }
}
