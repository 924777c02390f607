// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{BuildNumber, LabelGroup, ParsedResult, ResultCounts};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// A node found by hierarchical path resolution on a [`ResultTree`].
#[derive(Clone, Copy, Debug)]
pub enum Resolved<'a> {
    /// The path named a label group directly.
    Group(&'a LabelGroup),
    /// The path reached down into a parsed result.
    Result(&'a ParsedResult),
}

/// The two-tier aggregate for one build: every [`LabelGroup`] produced by
/// aggregation, keyed by label.
///
/// Labels iterate in lexicographic order, which keeps flattened views and
/// persisted output deterministic. The tree carries the same lazy rollup
/// cache as its groups, one level up.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultTree {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, LabelGroup>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<BuildNumber>,
    #[serde(skip, default)]
    cache: Mutex<Option<ResultCounts>>,
}

impl ResultTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::with_description("")
    }

    /// Creates an empty tree with a description.
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            groups: BTreeMap::new(),
            description: description.into(),
            owner: None,
            cache: Mutex::new(None),
        }
    }

    /// The labels currently in use, in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// The label groups, in sorted label order.
    pub fn groups(&self) -> impl Iterator<Item = &LabelGroup> {
        self.groups.values()
    }

    /// The group for `label`, if any.
    pub fn group(&self, label: &str) -> Option<&LabelGroup> {
        self.groups.get(label)
    }

    /// Routes `result` into the group for `label`, creating the group if
    /// this is the label's first result. Duplicates by identity are skipped.
    pub fn add_result(&mut self, label: &str, result: ParsedResult) {
        self.groups
            .entry(label.to_owned())
            .or_insert_with(|| LabelGroup::new(label))
            .add_result(result);
        self.mark_stale();
    }

    /// Adds a whole group under its own label. If the label already exists
    /// the groups are merged, skipping duplicate results.
    pub fn add_group(&mut self, group: LabelGroup) {
        use std::collections::btree_map::Entry;
        match self.groups.entry(group.label().to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(group);
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().add_all(group);
            }
        }
        self.mark_stale();
    }

    fn lock(&self) -> MutexGuard<'_, Option<ResultCounts>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_stale(&self) {
        *self.lock() = None;
    }

    fn compute_counts(&self) -> ResultCounts {
        let mut counts = ResultCounts::default();
        for group in self.groups.values() {
            counts.accumulate(group.counts());
        }
        counts
    }

    /// The aggregate counters over every label, recomputed if stale.
    pub fn counts(&self) -> ResultCounts {
        let mut cache = self.lock();
        match *cache {
            Some(counts) => counts,
            None => {
                let counts = self.compute_counts();
                *cache = Some(counts);
                counts
            }
        }
    }

    /// Forces a recompute of every group and of the tree's own rollup.
    pub fn tally(&self) {
        for group in self.groups.values() {
            group.tally();
        }
        *self.lock() = Some(self.compute_counts());
    }

    /// Returns true if the aggregate fail and skip counts are both zero.
    pub fn is_passed(&self) -> bool {
        self.counts().is_passed()
    }

    /// Returns true if any label recorded any tests.
    pub fn has_children(&self) -> bool {
        self.counts().total() != 0
    }

    /// Every group's children concatenated, in sorted label order.
    pub fn flatten(&self) -> impl Iterator<Item = &ParsedResult> {
        self.groups.values().flat_map(|group| group.children().iter())
    }

    /// Resolves a `label/childName/...` path.
    ///
    /// A bare label resolves to its group; deeper segments go through the
    /// group's name map and then by node name.
    pub fn resolve_descendant(&self, path: &str) -> Option<Resolved<'_>> {
        let (first, rest) = match path.split_once('/') {
            Some((first, rest)) => (first, rest),
            None => (path, ""),
        };
        let group = self.groups.get(first)?;
        if rest.is_empty() {
            Some(Resolved::Group(group))
        } else {
            group.resolve_descendant(rest).map(Resolved::Result)
        }
    }

    /// Generates fallback child names for every group missing a name map.
    pub fn ensure_names(&mut self) {
        for group in self.groups.values_mut() {
            group.ensure_names();
        }
    }

    /// A free-form description shown with the report.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Sets the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// The build this tree was attached to, if it has been attached.
    ///
    /// This is a non-owning back-reference recorded at attach time; history
    /// walking starts from it.
    pub fn owner(&self) -> Option<BuildNumber> {
        self.owner
    }

    /// Records the owning build.
    pub fn set_owner(&mut self, build: BuildNumber) {
        self.owner = Some(build);
    }
}

impl Default for ResultTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ResultTree {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
            description: self.description.clone(),
            owner: self.owner,
            cache: Mutex::new(None),
        }
    }
}

impl fmt::Display for ResultTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, group) in &self.groups {
            writeln!(f, "{label} results:")?;
            write!(f, "{group}")?;
        }
        Ok(())
    }
}
