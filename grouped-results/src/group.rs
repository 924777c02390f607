// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ChildIndexError, ParsedResult, ResultCounts, ResultId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::warn;

/// A unique name for each direct child of a [`LabelGroup`], used for
/// URL/path-style child resolution.
///
/// The map is built once per group and is immutable afterwards. Names are
/// unique within the group; the map preserves child order.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct NameMap {
    by_name: IndexMap<String, ResultId>,
}

impl NameMap {
    /// Looks up a child id by name.
    pub fn get(&self, name: &str) -> Option<ResultId> {
        self.by_name.get(name).copied()
    }

    /// Looks up the name recorded for a child id.
    pub fn name_of(&self, id: ResultId) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, child)| **child == id)
            .map(|(name, _)| name.as_str())
    }

    /// Iterates over `(name, id)` pairs in child order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ResultId)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The number of named children.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if no children are named.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Inserts a name, disambiguating collisions with a `-<index>` suffix so
    /// names stay unique within the group.
    fn insert_unique(&mut self, name: String, id: ResultId, index: usize) {
        if !self.by_name.contains_key(&name) {
            self.by_name.insert(name, id);
            return;
        }
        let disambiguated = format!("{name}-{index}");
        warn!("child name `{name}` is already taken; using `{disambiguated}`");
        self.by_name.insert(disambiguated, id);
    }
}

/// Cached rollup state for a group. Recomputed from the children whenever
/// the group observes that it is stale.
#[derive(Clone, Debug, Default)]
struct GroupSnapshot {
    counts: ResultCounts,
    passed: Vec<usize>,
    failing: Vec<usize>,
}

/// Several parsed results that share a common label.
///
/// A group holds at most one result per parser: the publisher merges
/// configurations sharing a (parser, label) pair before dispatch, and the
/// add operations here skip duplicates by result identity, so re-running
/// aggregation over the same inputs is idempotent.
///
/// Counter reads recompute lazily after any mutation. The cache sits behind
/// a mutex scoped to this one group, so shared references stay usable after
/// deserialization; single-writer discipline is still assumed for the
/// children themselves.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelGroup {
    label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ParsedResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    names: Option<NameMap>,
    #[serde(skip, default)]
    cache: Mutex<Option<GroupSnapshot>>,
}

impl LabelGroup {
    /// Creates an empty group for `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_results(label, vec![])
    }

    /// Creates a group for `label` holding `children`.
    pub fn with_results(label: impl Into<String>, children: Vec<ParsedResult>) -> Self {
        Self {
            label: label.into(),
            children,
            names: None,
            cache: Mutex::new(None),
        }
    }

    /// The label shared by every result in this group.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The results in this group, in insertion order.
    pub fn children(&self) -> &[ParsedResult] {
        &self.children
    }

    /// Returns true if the group holds any results.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Returns the child at `index`, or an out-of-range error.
    pub fn child_by_index(&self, index: usize) -> Result<&ParsedResult, ChildIndexError> {
        self.children
            .get(index)
            .ok_or_else(|| ChildIndexError::new(index, self.children.len()))
    }

    /// Adds `result` unless a result with the same identity is already
    /// present.
    pub fn add_result(&mut self, result: ParsedResult) {
        if self.contains(result.id()) {
            return;
        }
        self.children.push(result);
        self.mark_stale();
    }

    /// Merges the children of `other` in, skipping duplicates by identity.
    pub fn add_all(&mut self, other: LabelGroup) {
        for result in other.children {
            self.add_result(result);
        }
    }

    fn contains(&self, id: ResultId) -> bool {
        self.children.iter().any(|c| c.id() == id)
    }

    fn lock(&self) -> MutexGuard<'_, Option<GroupSnapshot>> {
        // A panic while holding the lock leaves at worst a stale snapshot,
        // which the next read recomputes, so poisoning is recoverable.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_stale(&self) {
        *self.lock() = None;
    }

    fn compute_snapshot(&self) -> GroupSnapshot {
        let mut counts = ResultCounts::default();
        let mut passed = Vec::new();
        let mut failing = Vec::new();
        for (index, child) in self.children.iter().enumerate() {
            // Children recompute themselves; composite results re-sum their
            // own subtrees here.
            let child_counts = child.counts();
            counts.accumulate(child_counts);
            if child_counts.is_passed() {
                passed.push(index);
            } else if child_counts.failed > 0 {
                failing.push(index);
            }
        }
        GroupSnapshot {
            counts,
            passed,
            failing,
        }
    }

    fn snapshot(&self) -> GroupSnapshot {
        let mut cache = self.lock();
        match &*cache {
            Some(snapshot) => snapshot.clone(),
            None => {
                let snapshot = self.compute_snapshot();
                *cache = Some(snapshot.clone());
                snapshot
            }
        }
    }

    /// Forces a recompute of the cached rollup, whether or not it is stale.
    ///
    /// Called once after aggregation finishes and after deserializing a
    /// persisted tree.
    pub fn tally(&self) {
        *self.lock() = Some(self.compute_snapshot());
    }

    /// The rollup counters for this group, recomputed if stale.
    pub fn counts(&self) -> ResultCounts {
        self.snapshot().counts
    }

    /// Returns true if nothing in this group failed or was skipped.
    pub fn is_passed(&self) -> bool {
        self.counts().is_passed()
    }

    /// The children that passed cleanly.
    pub fn passed_children(&self) -> Vec<&ParsedResult> {
        self.snapshot()
            .passed
            .iter()
            .map(|&index| &self.children[index])
            .collect()
    }

    /// The children with at least one failure.
    pub fn failing_children(&self) -> Vec<&ParsedResult> {
        self.snapshot()
            .failing
            .iter()
            .map(|&index| &self.children[index])
            .collect()
    }

    /// Returns true once a name map has been recorded.
    pub fn names_set(&self) -> bool {
        self.names.is_some()
    }

    /// Records a unique name for each child, using names chosen by the
    /// caller.
    ///
    /// This is the preferred naming path: the aggregation step can use
    /// context that is no longer available later, such as a parser's display
    /// name. Children missing from `assignments` fall back to a generated
    /// `result-<index>` name so the map stays total.
    ///
    /// # Panics
    ///
    /// Panics if a name map already exists. Naming is write-once; calling
    /// this twice indicates an orchestration bug.
    pub fn set_name_map(&mut self, assignments: &HashMap<ResultId, String>) {
        assert!(
            self.names.is_none(),
            "name map for label `{}` has already been set",
            self.label
        );
        let mut names = NameMap::default();
        for (index, child) in self.children.iter().enumerate() {
            let name = match assignments.get(&child.id()) {
                Some(name) => name.clone(),
                None => {
                    warn!(
                        "no name supplied for result `{}` in label `{}`; generating one",
                        child.name(),
                        self.label
                    );
                    format!("result-{index}")
                }
            };
            names.insert_unique(name, child.id(), index);
        }
        self.names = Some(names);
    }

    /// Records a generated `result-<index>` name for each child.
    ///
    /// Fallback for trees whose name map was lost (for example persisted
    /// data from before names were stored); drill-down stays functional even
    /// without proper names.
    ///
    /// # Panics
    ///
    /// Panics if a name map already exists.
    pub fn lock_in_names(&mut self) {
        assert!(
            self.names.is_none(),
            "name map for label `{}` has already been set",
            self.label
        );
        warn!(
            "generating fallback child names for label `{}`; supplied names are preferred",
            self.label
        );
        let mut names = NameMap::default();
        for (index, child) in self.children.iter().enumerate() {
            names.insert_unique(format!("result-{index}"), child.id(), index);
        }
        self.names = Some(names);
    }

    /// Generates fallback names only if no name map exists yet.
    pub fn ensure_names(&mut self) {
        if self.names.is_none() {
            self.lock_in_names();
        }
    }

    fn names(&self) -> &NameMap {
        self.names.as_ref().unwrap_or_else(|| {
            panic!(
                "child names for label `{}` requested before naming was finalized",
                self.label
            )
        })
    }

    /// The name recorded for `id`, or `None` (with a warning) for a result
    /// this group does not know.
    ///
    /// # Panics
    ///
    /// Panics if no name map has been recorded yet.
    pub fn display_name_of(&self, id: ResultId) -> Option<&str> {
        let name = self.names().name_of(id);
        if name.is_none() {
            warn!("label `{}` has no name for result {id}", self.label);
        }
        name
    }

    /// Looks up a direct child by its recorded name.
    ///
    /// # Panics
    ///
    /// Panics if no name map has been recorded yet.
    pub fn child_named(&self, name: &str) -> Option<&ParsedResult> {
        let id = self.names().get(name)?;
        self.children.iter().find(|c| c.id() == id)
    }

    /// Resolves a `/`-separated path against this group.
    ///
    /// The first segment is looked up in the name map; any remainder
    /// recurses into the matched child by node name.
    ///
    /// # Panics
    ///
    /// Panics if no name map has been recorded yet.
    pub fn resolve_descendant(&self, path: &str) -> Option<&ParsedResult> {
        let (first, rest) = match path.split_once('/') {
            Some((first, rest)) => (first, rest),
            None => (path, ""),
        };
        let child = self.child_named(first)?;
        if rest.is_empty() {
            Some(child)
        } else {
            child.resolve_descendant(rest)
        }
    }
}

impl Clone for LabelGroup {
    fn clone(&self) -> Self {
        // The clone starts with a stale cache and recomputes on first read.
        Self {
            label: self.label.clone(),
            children: self.children.clone(),
            names: self.names.clone(),
            cache: Mutex::new(None),
        }
    }
}

impl fmt::Display for LabelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.label, self.counts())?;
        for child in &self.children {
            writeln!(f, "\t{child}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(name: &str, passed: usize, failed: usize, skipped: usize) -> ParsedResult {
        let mut r = ParsedResult::new("junit", name);
        r.set_counts(passed, failed, skipped);
        r
    }

    #[test]
    fn totals_hold_after_tally() {
        let mut group = LabelGroup::new("unit");
        group.add_result(result("a", 10, 2, 1));
        group.add_result(result("b", 5, 0, 0));
        group.tally();
        let counts = group.counts();
        assert_eq!(counts.total(), counts.passed + counts.failed + counts.skipped);
        assert_eq!(counts.total(), 18);
    }

    #[test]
    fn tally_is_idempotent() {
        let mut group = LabelGroup::new("unit");
        group.add_result(result("a", 3, 1, 0));
        group.tally();
        let first = group.counts();
        group.tally();
        assert_eq!(group.counts(), first);
    }

    #[test]
    fn duplicate_adds_are_skipped() {
        let mut group = LabelGroup::new("unit");
        let r = result("a", 3, 0, 0);
        group.add_result(r.clone());
        group.add_result(r);
        assert_eq!(group.children().len(), 1);
        assert_eq!(group.counts().passed, 3);
    }

    #[test]
    fn add_all_merges_without_duplicates() {
        let shared = result("shared", 1, 0, 0);
        let mut group = LabelGroup::with_results("unit", vec![shared.clone()]);
        let other = LabelGroup::with_results("unit", vec![shared, result("new", 2, 0, 0)]);
        group.add_all(other);
        assert_eq!(group.children().len(), 2);
        assert_eq!(group.counts().passed, 3);
    }

    #[test]
    fn counts_recompute_after_mutation() {
        let mut group = LabelGroup::new("unit");
        group.add_result(result("a", 1, 0, 0));
        assert_eq!(group.counts().passed, 1);
        group.add_result(result("b", 2, 1, 0));
        // The earlier read cached a snapshot; the add marked it stale.
        assert_eq!(group.counts().passed, 3);
        assert_eq!(group.counts().failed, 1);
    }

    #[test]
    fn failure_partition_classifies_children() {
        let mut group = LabelGroup::new("unit");
        group.add_result(result("ok", 3, 0, 0));
        group.add_result(result("bad", 1, 2, 0));
        group.add_result(result("skippy", 1, 0, 1));
        let passed: Vec<_> = group.passed_children().iter().map(|r| r.name().to_owned()).collect();
        let failing: Vec<_> = group.failing_children().iter().map(|r| r.name().to_owned()).collect();
        assert_eq!(passed, ["ok"]);
        assert_eq!(failing, ["bad"]);
    }

    #[test]
    fn child_by_index_rejects_out_of_range() {
        let group = LabelGroup::with_results("unit", vec![result("a", 1, 0, 0)]);
        assert!(group.child_by_index(0).is_ok());
        let error = group.child_by_index(1).unwrap_err();
        assert_eq!(error.index(), 1);
        assert_eq!(error.count(), 1);
    }

    #[test]
    fn name_map_records_supplied_names() {
        let a = result("a", 1, 0, 0);
        let b = result("b", 2, 0, 0);
        let assignments = HashMap::from([
            (a.id(), "junit".to_owned()),
            (b.id(), "cppunit".to_owned()),
        ]);
        let mut group = LabelGroup::with_results("unit", vec![a.clone(), b]);
        group.set_name_map(&assignments);
        assert_eq!(group.display_name_of(a.id()), Some("junit"));
        assert_eq!(group.child_named("cppunit").map(|r| r.name()), Some("b"));
    }

    #[test]
    #[should_panic(expected = "name map for label `unit` has already been set")]
    fn name_map_is_write_once() {
        let mut group = LabelGroup::with_results("unit", vec![result("a", 1, 0, 0)]);
        group.lock_in_names();
        group.set_name_map(&HashMap::new());
    }

    #[test]
    #[should_panic(expected = "before naming was finalized")]
    fn resolution_before_naming_is_fatal() {
        let group = LabelGroup::with_results("unit", vec![result("a", 1, 0, 0)]);
        group.resolve_descendant("a");
    }

    #[test]
    fn fallback_names_are_indexed() {
        let mut group =
            LabelGroup::with_results("unit", vec![result("a", 1, 0, 0), result("b", 2, 0, 0)]);
        group.lock_in_names();
        assert_eq!(group.child_named("result-0").map(|r| r.name()), Some("a"));
        assert_eq!(group.child_named("result-1").map(|r| r.name()), Some("b"));
    }

    #[test]
    fn ensure_names_is_a_no_op_once_set() {
        let a = result("a", 1, 0, 0);
        let assignments = HashMap::from([(a.id(), "junit".to_owned())]);
        let mut group = LabelGroup::with_results("unit", vec![a.clone()]);
        group.set_name_map(&assignments);
        group.ensure_names();
        assert_eq!(group.display_name_of(a.id()), Some("junit"));
    }

    #[test]
    fn colliding_names_are_disambiguated() {
        let a = result("a", 1, 0, 0);
        let b = result("b", 2, 0, 0);
        let assignments = HashMap::from([
            (a.id(), "junit".to_owned()),
            (b.id(), "junit".to_owned()),
        ]);
        let mut group = LabelGroup::with_results("unit", vec![a, b]);
        group.set_name_map(&assignments);
        assert!(group.child_named("junit").is_some());
        assert!(group.child_named("junit-1").is_some());
    }

    #[test]
    fn resolve_descendant_reaches_nested_results() {
        let mut suite = result("suite", 0, 0, 0);
        let mut case = ParsedResult::new("junit", "case");
        case.set_counts(1, 0, 0);
        suite.add_child(case);
        let assignments = HashMap::from([(suite.id(), "junit".to_owned())]);
        let mut group = LabelGroup::with_results("unit", vec![suite]);
        group.set_name_map(&assignments);

        assert_eq!(group.resolve_descendant("junit").map(|r| r.name()), Some("suite"));
        assert_eq!(
            group.resolve_descendant("junit/case").map(|r| r.name()),
            Some("case")
        );
        assert!(group.resolve_descendant("junit/nope").is_none());
        // A trailing slash resolves to the direct match.
        assert_eq!(group.resolve_descendant("junit/").map(|r| r.name()), Some("suite"));
    }

    #[test]
    fn serde_round_trip_keeps_names_and_counts() {
        let a = result("a", 4, 1, 0);
        let assignments = HashMap::from([(a.id(), "junit".to_owned())]);
        let mut group = LabelGroup::with_results("unit", vec![a.clone()]);
        group.set_name_map(&assignments);
        group.tally();

        let json = serde_json::to_string(&group).expect("group serializes");
        let back: LabelGroup = serde_json::from_str(&json).expect("group deserializes");
        // The cache is not persisted; the first read recomputes it.
        assert_eq!(back.counts(), group.counts());
        assert_eq!(back.display_name_of(a.id()), Some("junit"));
    }
}
