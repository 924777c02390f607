// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Navigation across a project's build history: previous results, diffs and
//! trend series.

use crate::store::ResultStore;
use grouped_results::{BuildNumber, CountsDelta, LabelGroup, ResultTree};
use std::{collections::HashSet, sync::Arc};
use tracing::warn;

/// The host CI server's view of one project's build sequence.
///
/// Implementations enumerate builds newest-first through
/// [`previous`](BuildChain::previous) and know which builds recorded
/// aggregated results. The chain is expected to be finite and acyclic; the
/// walker guards against corrupted chains anyway.
pub trait BuildChain {
    /// The most recent build, if any build exists.
    fn latest(&self) -> Option<BuildNumber>;

    /// The build immediately before `build`, if any.
    fn previous(&self, build: BuildNumber) -> Option<BuildNumber>;

    /// Returns true if aggregated results were recorded for `build`.
    fn has_results(&self, build: BuildNumber) -> bool;

    /// The most recent successful build, if known.
    ///
    /// Used as a fence by [`HistoryWalker::latest_tree`]: if even the last
    /// successful build produced no results, the project simply has no tests
    /// configured and the walk gives up.
    fn last_successful(&self) -> Option<BuildNumber> {
        None
    }
}

/// One sample in a trend series.
#[derive(Clone, Debug)]
pub struct TrendPoint {
    /// The build the sample came from.
    pub build: BuildNumber,

    /// The label's group in that build. An empty placeholder group when the
    /// build recorded results but not for this label, so the series stays
    /// aligned with build numbers.
    pub group: LabelGroup,
}

/// Walks backward through prior builds to find earlier result trees, for
/// build-over-build diffs and trend series.
pub struct HistoryWalker<'a, C: BuildChain + ?Sized> {
    chain: &'a C,
    store: &'a ResultStore,
}

impl<'a, C: BuildChain + ?Sized> HistoryWalker<'a, C> {
    /// Creates a walker over one project's chain and store.
    pub fn new(chain: &'a C, store: &'a ResultStore) -> Self {
        Self { chain, store }
    }

    /// Finds the nearest build before `from` that recorded any results, and
    /// loads its tree.
    ///
    /// Returns `None` at the first build or when no earlier build recorded
    /// results. The walk inspects each build at most once, so it terminates
    /// even on a corrupted, cyclic chain (with a warning).
    pub fn previous_tree(&self, from: BuildNumber) -> Option<(BuildNumber, Arc<ResultTree>)> {
        let mut visited = HashSet::from([from]);
        let mut current = from;
        while let Some(build) = self.chain.previous(current) {
            if !visited.insert(build) {
                warn!("build chain contains a cycle at {build}; giving up on history");
                return None;
            }
            if self.chain.has_results(build) {
                return Some((build, self.store.load(build)));
            }
            current = build;
        }
        None
    }

    /// Finds this label's group in the nearest prior build with recorded
    /// results.
    ///
    /// The walk stops at the first build that has *any* result tree; if that
    /// tree lacks the label, the answer is `None` rather than a deeper walk.
    pub fn previous_group(&self, from: BuildNumber, label: &str) -> Option<LabelGroup> {
        let (_, tree) = self.previous_tree(from)?;
        tree.group(label).cloned()
    }

    /// The build-over-build change in a tree's aggregate counters.
    ///
    /// Diffs against zero when the tree has no owner or no predecessor, so a
    /// first build reports its own counts as the delta.
    pub fn tree_delta(&self, tree: &ResultTree) -> CountsDelta {
        let previous = tree
            .owner()
            .and_then(|build| self.previous_tree(build))
            .map(|(_, previous)| previous.counts());
        tree.counts().delta_from(previous)
    }

    /// The build-over-build change for one label's counters.
    pub fn group_delta(&self, tree: &ResultTree, label: &str) -> CountsDelta {
        let previous = tree
            .owner()
            .and_then(|build| self.previous_group(build, label))
            .map(|group| group.counts());
        let current = tree.group(label).map(|group| group.counts()).unwrap_or_default();
        current.delta_from(previous)
    }

    /// The most recent build with recorded results, and its tree.
    ///
    /// Walks back from the latest build, giving up once the walk has passed
    /// the last successful build: if even that build recorded nothing, no
    /// tests are configured for this project.
    pub fn latest_tree(&self) -> Option<(BuildNumber, Arc<ResultTree>)> {
        let fence = self.chain.last_successful();
        let mut visited = HashSet::new();
        let mut current = self.chain.latest()?;
        loop {
            if !visited.insert(current) {
                warn!("build chain contains a cycle at {current}; giving up on history");
                return None;
            }
            if self.chain.has_results(current) {
                return Some((current, self.store.load(current)));
            }
            if Some(current) == fence {
                return None;
            }
            current = self.chain.previous(current)?;
        }
    }

    /// A lazy trend series for `label`, newest build first.
    ///
    /// Yields up to `max_samples` points, one per build that recorded any
    /// results; builds whose tree lacks the label contribute an empty
    /// placeholder group, so the series has no gaps in build alignment.
    /// Trees load through the store's cache as the iterator advances.
    pub fn trend(&self, label: &str, max_samples: usize) -> Trend<'a, C> {
        Trend {
            chain: self.chain,
            store: self.store,
            label: label.to_owned(),
            next: self.chain.latest(),
            remaining: max_samples,
            visited: HashSet::new(),
        }
    }
}

/// Lazy iterator over a label's historical groups, newest build first.
///
/// Created by [`HistoryWalker::trend`].
pub struct Trend<'a, C: BuildChain + ?Sized> {
    chain: &'a C,
    store: &'a ResultStore,
    label: String,
    next: Option<BuildNumber>,
    remaining: usize,
    visited: HashSet<BuildNumber>,
}

impl<C: BuildChain + ?Sized> Iterator for Trend<'_, C> {
    type Item = TrendPoint;

    fn next(&mut self) -> Option<TrendPoint> {
        while self.remaining > 0 {
            let build = self.next?;
            if !self.visited.insert(build) {
                warn!("build chain contains a cycle at {build}; ending trend series");
                self.next = None;
                return None;
            }
            self.next = self.chain.previous(build);
            if !self.chain.has_results(build) {
                continue;
            }
            self.remaining -= 1;
            let tree = self.store.load(build);
            let group = tree
                .group(&self.label)
                .cloned()
                .unwrap_or_else(|| LabelGroup::new(&self.label));
            return Some(TrendPoint { build, group });
        }
        None
    }
}
