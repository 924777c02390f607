// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence and cached reload of per-build result trees.

use crate::{
    errors::StoreError,
    record::{decode_results_file, ResultsFileRef, ResultsRecord, RESULTS_FILE_NAME,
        RESULTS_FORMAT_VERSION},
};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use grouped_results::{BuildNumber, ResultTree};
use indexmap::IndexMap;
use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

/// A bounded, least-recently-used cache of loaded trees.
///
/// Entries are kept in recency order: a hit moves the entry to the back, an
/// insert past capacity evicts the front. Deterministic eviction makes the
/// cache testable, and eviction is always transparent because the next read
/// reloads from storage.
#[derive(Debug)]
struct TreeCache {
    capacity: usize,
    entries: IndexMap<BuildNumber, Arc<ResultTree>>,
}

impl TreeCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
        }
    }

    fn get(&mut self, build: BuildNumber) -> Option<Arc<ResultTree>> {
        let tree = self.entries.shift_remove(&build)?;
        self.entries.insert(build, Arc::clone(&tree));
        Some(tree)
    }

    fn insert(&mut self, build: BuildNumber, tree: Arc<ResultTree>) {
        self.entries.shift_remove(&build);
        self.entries.insert(build, tree);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    fn contains(&self, build: BuildNumber) -> bool {
        self.entries.contains_key(&build)
    }
}

/// Stores one result tree per build as a side file in that build's
/// directory, separate from the build's own metadata.
///
/// Loading never fails: a missing, unreadable or incompatible side file is
/// logged and replaced with an empty tree, because a missing report must not
/// fail a build retroactively. Trees read or written recently are served
/// from memory through a bounded LRU cache; in particular, the first access
/// after [`attach`](ResultStore::attach) never touches storage.
#[derive(Debug)]
pub struct ResultStore {
    builds_dir: Utf8PathBuf,
    cache: Mutex<TreeCache>,
}

impl ResultStore {
    /// The default number of trees kept in memory.
    pub const DEFAULT_CACHE_CAPACITY: usize = 8;

    /// Creates a store rooted at a project's builds directory, creating the
    /// directory if needed.
    pub fn new(builds_dir: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        Self::with_cache_capacity(builds_dir, Self::DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a store with an explicit cache capacity (minimum 1).
    pub fn with_cache_capacity(
        builds_dir: impl Into<Utf8PathBuf>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let builds_dir = builds_dir.into();
        std::fs::create_dir_all(&builds_dir).map_err(|error| StoreError::CreateDir {
            dir: builds_dir.clone(),
            error,
        })?;
        Ok(Self {
            builds_dir,
            cache: Mutex::new(TreeCache::new(capacity)),
        })
    }

    /// The directory this store keeps build data under.
    pub fn builds_dir(&self) -> &Utf8Path {
        &self.builds_dir
    }

    fn build_dir(&self, build: BuildNumber) -> Utf8PathBuf {
        self.builds_dir.join(build.get().to_string())
    }

    fn results_path(&self, build: BuildNumber) -> Utf8PathBuf {
        self.build_dir(build).join(RESULTS_FILE_NAME)
    }

    fn lock(&self) -> MutexGuard<'_, TreeCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches a freshly aggregated tree to `build`: finalizes it, caches
    /// it in memory, writes the side file and returns the summary record for
    /// the build's metadata.
    ///
    /// The tree stays reachable in memory even if the write fails, so the
    /// current process keeps serving results; the error is returned for the
    /// caller to report on its listener stream, and only the next process
    /// will see the report as missing.
    pub fn attach(
        &self,
        build: BuildNumber,
        mut tree: ResultTree,
    ) -> Result<ResultsRecord, StoreError> {
        tree.set_owner(build);
        tree.ensure_names();
        tree.tally();
        let record = ResultsRecord::summarize(&tree);

        let tree = Arc::new(tree);
        self.lock().insert(build, Arc::clone(&tree));

        let json = serde_json::to_string_pretty(&ResultsFileRef {
            format_version: RESULTS_FORMAT_VERSION,
            recorded_at: Utc::now().fixed_offset(),
            tree: tree.as_ref(),
        })
        .map_err(|error| StoreError::Serialize { build, error })?;

        let dir = self.build_dir(build);
        std::fs::create_dir_all(&dir).map_err(|error| StoreError::CreateDir { dir, error })?;

        let path = self.results_path(build);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| StoreError::Write { path, error })?;

        Ok(record)
    }

    /// Loads the result tree for `build`.
    ///
    /// Served from the cache when possible; otherwise read from the side
    /// file and normalized (owner stamped, names ensured, re-tallied). Any
    /// failure to read or decode yields an empty tree and a warning, never
    /// an error.
    pub fn load(&self, build: BuildNumber) -> Arc<ResultTree> {
        if let Some(tree) = self.lock().get(build) {
            return tree;
        }
        let tree = Arc::new(self.load_from_disk(build));
        self.lock().insert(build, Arc::clone(&tree));
        tree
    }

    fn load_from_disk(&self, build: BuildNumber) -> ResultTree {
        let path = self.results_path(build);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) => {
                if error.kind() == io::ErrorKind::NotFound {
                    debug!("no results recorded at `{path}`");
                } else {
                    warn!("failed to read `{path}`: {error}; substituting empty results");
                }
                return Self::empty_tree(build);
            }
        };
        match decode_results_file(&contents) {
            Ok(tree) => Self::normalize(build, tree),
            Err(error) => {
                warn!("failed to load `{path}`: {error}; substituting empty results");
                Self::empty_tree(build)
            }
        }
    }

    /// Resolves a build's tree through its metadata record.
    ///
    /// A legacy record with the tree embedded inline is authoritative: it is
    /// normalized and cached without requiring the side file to exist.
    /// Records in the current shape go through [`load`](ResultStore::load).
    pub fn resolve(&self, build: BuildNumber, record: &ResultsRecord) -> Arc<ResultTree> {
        let Some(inline) = &record.inline_tree else {
            return self.load(build);
        };
        if let Some(tree) = self.lock().get(build) {
            return tree;
        }
        debug!("build {build} carries legacy inline results; using them as-is");
        let tree = Arc::new(Self::normalize(build, inline.clone()));
        self.lock().insert(build, Arc::clone(&tree));
        tree
    }

    /// Returns true if `build` has results in memory or on disk.
    pub fn has_results(&self, build: BuildNumber) -> bool {
        self.lock().contains(build) || self.results_path(build).exists()
    }

    fn normalize(build: BuildNumber, mut tree: ResultTree) -> ResultTree {
        tree.set_owner(build);
        tree.ensure_names();
        tree.tally();
        tree
    }

    fn empty_tree(build: BuildNumber) -> ResultTree {
        let mut tree = ResultTree::new();
        tree.set_owner(build);
        tree
    }

    #[cfg(test)]
    pub(crate) fn cached_builds(&self) -> Vec<BuildNumber> {
        self.lock().entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use grouped_results::ParsedResult;
    use pretty_assertions::assert_eq;

    fn tree_with(passed: usize, failed: usize) -> ResultTree {
        let mut tree = ResultTree::new();
        let mut result = ParsedResult::new("junit", "suite");
        result.set_counts(passed, failed, 0);
        tree.add_result("unit", result);
        tree
    }

    fn store_in(dir: &Utf8TempDir, capacity: usize) -> ResultStore {
        ResultStore::with_cache_capacity(dir.path().join("builds"), capacity)
            .expect("store creates its directory")
    }

    #[test]
    fn attach_then_load_round_trips() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(1);

        let record = store.attach(build, tree_with(12, 3)).expect("attach succeeds");
        assert_eq!(record.total, 15);
        assert_eq!(record.failed, 3);

        let loaded = store.load(build);
        assert_eq!(loaded.counts().passed, 12);
        assert_eq!(loaded.owner(), Some(build));
    }

    #[test]
    fn first_access_after_attach_skips_storage() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(1);
        store.attach(build, tree_with(5, 0)).expect("attach succeeds");

        // Corrupt the side file; a cache hit never notices.
        std::fs::write(store.results_path(build), "not json").expect("overwrite");
        let loaded = store.load(build);
        assert_eq!(loaded.counts().passed, 5);
    }

    #[test]
    fn missing_results_load_as_an_empty_tree() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let loaded = store.load(BuildNumber::new(42));
        assert_eq!(loaded.counts().total(), 0);
        assert_eq!(loaded.owner(), Some(BuildNumber::new(42)));
    }

    #[test]
    fn corrupt_results_load_as_an_empty_tree() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(7);
        let dir_path = store.build_dir(build);
        std::fs::create_dir_all(&dir_path).expect("build dir");
        std::fs::write(store.results_path(build), "{ definitely not json").expect("write");

        let loaded = store.load(build);
        assert_eq!(loaded.counts().total(), 0);
    }

    #[test]
    fn newer_format_version_loads_as_an_empty_tree() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(7);
        std::fs::create_dir_all(store.build_dir(build)).expect("build dir");
        std::fs::write(
            store.results_path(build),
            r#"{"format-version": 99, "tree": {}}"#,
        )
        .expect("write");

        let loaded = store.load(build);
        assert_eq!(loaded.counts().total(), 0);
    }

    #[test]
    fn eviction_is_deterministic_and_transparent() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 2);
        for n in 1..=3 {
            store
                .attach(BuildNumber::new(n), tree_with(n as usize, 0))
                .expect("attach succeeds");
        }
        // Capacity 2: build 1 was evicted, 2 and 3 remain.
        assert_eq!(
            store.cached_builds(),
            [BuildNumber::new(2), BuildNumber::new(3)]
        );

        // The evicted build reloads from storage with the same counts.
        let reloaded = store.load(BuildNumber::new(1));
        assert_eq!(reloaded.counts().passed, 1);
        // ...and build 2 became the eviction candidate.
        assert_eq!(
            store.cached_builds(),
            [BuildNumber::new(3), BuildNumber::new(1)]
        );
    }

    #[test]
    fn cache_hits_refresh_recency() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 2);
        store.attach(BuildNumber::new(1), tree_with(1, 0)).expect("attach");
        store.attach(BuildNumber::new(2), tree_with(2, 0)).expect("attach");
        store.load(BuildNumber::new(1));
        store.attach(BuildNumber::new(3), tree_with(3, 0)).expect("attach");
        // Build 2 was least recently used, so it went first.
        assert_eq!(
            store.cached_builds(),
            [BuildNumber::new(1), BuildNumber::new(3)]
        );
    }

    #[test]
    fn legacy_inline_record_is_authoritative_without_a_side_file() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(9);

        let mut record = ResultsRecord::summarize(&ResultTree::new());
        record.inline_tree = Some(tree_with(6, 1));

        let tree = store.resolve(build, &record);
        assert_eq!(tree.counts().passed, 6);
        assert_eq!(tree.owner(), Some(build));
        // The inline tree got fallback names during normalization.
        let group = tree.group("unit").expect("group exists");
        assert!(group.child_named("result-0").is_some());
    }

    #[test]
    fn current_records_resolve_through_the_side_file() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 4);
        let build = BuildNumber::new(2);
        let record = store.attach(build, tree_with(4, 0)).expect("attach succeeds");
        assert!(!record.is_legacy());

        let tree = store.resolve(build, &record);
        assert_eq!(tree.counts().passed, 4);
    }

    #[test]
    fn has_results_checks_memory_and_disk() {
        let dir = Utf8TempDir::new().expect("temp dir");
        let store = store_in(&dir, 1);
        assert!(!store.has_results(BuildNumber::new(1)));
        store.attach(BuildNumber::new(1), tree_with(1, 0)).expect("attach");
        store.attach(BuildNumber::new(2), tree_with(2, 0)).expect("attach");
        // Build 1 fell out of the single-entry cache but is on disk.
        assert!(store.has_results(BuildNumber::new(1)));
        assert!(store.has_results(BuildNumber::new(2)));
    }
}
