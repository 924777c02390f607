// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BuildHealth, ResultCounts};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use uuid::Uuid;

/// Unique identity of a parsed result.
///
/// Two results are the same result if and only if their ids are equal;
/// cloning and serialization both preserve the id. Groups use this to make
/// their add operations idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ResultId(Uuid);

impl ResultId {
    /// Creates a new random `ResultId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `ResultId` from a `u128`. Mostly useful for testing.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The structured outcome of running one result-format parser over a set of
/// matched files.
///
/// Parsed results are produced by format parsers, never by this crate. A
/// result is a tree: leaf nodes carry the counters the parser reported, and
/// composite nodes derive their counters by summing their children, so
/// format-specific nesting (suites containing cases, say) rolls up without
/// the aggregation layer knowing anything about the format.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParsedResult {
    id: ResultId,
    format: String,
    name: String,
    #[serde(default)]
    passed: usize,
    #[serde(default)]
    failed: usize,
    #[serde(default)]
    skipped: usize,
    #[serde(default)]
    duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    health: Option<BuildHealth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ParsedResult>,
}

impl ParsedResult {
    /// Creates a new, empty result with a fresh identity.
    ///
    /// `format` is the identifier of the parser that produced the result;
    /// `name` is the result's own node name, used for descendant resolution
    /// below the group level.
    pub fn new(format: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResultId::new(),
            format: format.into(),
            name: name.into(),
            passed: 0,
            failed: 0,
            skipped: 0,
            duration: Duration::ZERO,
            health: None,
            children: vec![],
        }
    }

    /// The unique identity of this result.
    pub fn id(&self) -> ResultId {
        self.id
    }

    /// The identifier of the parser that produced this result.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The result's own node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The build health this result asks for, if any.
    pub fn health(&self) -> Option<BuildHealth> {
        self.health
    }

    /// The nested children of this result, if the format is hierarchical.
    pub fn children(&self) -> &[ParsedResult] {
        &self.children
    }

    /// Sets the pass/fail/skip counters. Composite nodes ignore these in
    /// favor of their children's sums.
    pub fn set_counts(&mut self, passed: usize, failed: usize, skipped: usize) -> &mut Self {
        self.passed = passed;
        self.failed = failed;
        self.skipped = skipped;
        self
    }

    /// Sets the execution time of this node.
    pub fn set_duration(&mut self, duration: Duration) -> &mut Self {
        self.duration = duration;
        self
    }

    /// Sets the build health this result asks for.
    pub fn set_health(&mut self, health: BuildHealth) -> &mut Self {
        self.health = Some(health);
        self
    }

    /// Adds a nested child result.
    pub fn add_child(&mut self, child: ParsedResult) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Adds several nested child results.
    pub fn add_children(&mut self, children: impl IntoIterator<Item = ParsedResult>) -> &mut Self {
        self.children.extend(children);
        self
    }

    /// Recomputes this result's rollup counters.
    ///
    /// Leaf nodes report the counters the parser set; composite nodes sum
    /// their children recursively. The duration of a composite node is the
    /// sum of its children's durations.
    pub fn counts(&self) -> ResultCounts {
        if self.children.is_empty() {
            return ResultCounts {
                passed: self.passed,
                failed: self.failed,
                skipped: self.skipped,
                duration: self.duration,
            };
        }
        let mut counts = ResultCounts::default();
        for child in &self.children {
            counts.accumulate(child.counts());
        }
        counts
    }

    /// Returns true if nothing in this result failed or was skipped.
    pub fn is_passed(&self) -> bool {
        self.counts().is_passed()
    }

    /// Resolves a `/`-separated path against this result's descendants.
    ///
    /// The first segment is matched against the children's node names; any
    /// remainder recurses into the matched child. Returns `None` if no child
    /// matches.
    pub fn resolve_descendant(&self, path: &str) -> Option<&ParsedResult> {
        let (first, rest) = match path.split_once('/') {
            Some((first, rest)) => (first, rest),
            None => (path, ""),
        };
        let child = self.children.iter().find(|c| c.name == first)?;
        if rest.is_empty() {
            Some(child)
        } else {
            child.resolve_descendant(rest)
        }
    }
}

impl fmt::Display for ParsedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.counts())
    }
}
