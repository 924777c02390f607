// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted formats: the per-build side file and the summary record kept
//! in the build's own metadata.

use chrono::{DateTime, FixedOffset};
use grouped_results::ResultTree;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The name of the side file holding a build's serialized result tree,
/// inside that build's directory.
pub static RESULTS_FILE_NAME: &str = "grouped-results.json";

/// The current format version of the side file.
///
/// Increment when adding semantically important fields. Readers accept older
/// versions (append-only evolution with serde defaults) and refuse newer
/// ones.
pub const RESULTS_FORMAT_VERSION: u32 = 1;

/// Write-side view of the side file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ResultsFileRef<'a> {
    pub(crate) format_version: u32,
    pub(crate) recorded_at: DateTime<FixedOffset>,
    pub(crate) tree: &'a ResultTree,
}

/// Read-side view of the side file.
///
/// Before the format was versioned the tree was written bare; the untagged
/// fallback keeps those files readable. Decoded payloads are normalized into
/// a plain [`ResultTree`] immediately.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultsFileFormat {
    Versioned {
        #[serde(rename = "format-version")]
        format_version: u32,
        #[serde(rename = "recorded-at", default)]
        recorded_at: Option<DateTime<FixedOffset>>,
        tree: ResultTree,
    },
    Bare(ResultTree),
}

/// Why a side file could not be decoded.
#[derive(Debug, Error)]
pub(crate) enum ResultsDecodeError {
    #[error("failed to deserialize results file")]
    Deserialize(#[from] serde_json::Error),

    #[error("results file format version {found} is newer than supported version {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Decodes a side file's contents into a result tree.
pub(crate) fn decode_results_file(contents: &str) -> Result<ResultTree, ResultsDecodeError> {
    match serde_json::from_str::<ResultsFileFormat>(contents)? {
        ResultsFileFormat::Versioned {
            format_version,
            recorded_at: _,
            tree,
        } => {
            if format_version > RESULTS_FORMAT_VERSION {
                return Err(ResultsDecodeError::VersionTooNew {
                    found: format_version,
                    supported: RESULTS_FORMAT_VERSION,
                });
            }
            Ok(tree)
        }
        ResultsFileFormat::Bare(tree) => Ok(tree),
    }
}

/// The summary a build's own metadata keeps about its aggregated results.
///
/// The counters let the host render totals without touching the side file.
/// Older builds stored the entire result tree inline here instead of in a
/// side file; such records are still readable and are treated as
/// authoritative, but they are never rewritten on disk — normalization is
/// in-memory only, because rewriting historical build records risks
/// corrupting them.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsRecord {
    /// The total number of tests.
    pub total: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The legacy embedded form of the result tree, if this record predates
    /// side-file storage.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "result-group"
    )]
    pub inline_tree: Option<ResultTree>,
}

impl ResultsRecord {
    /// Builds the summary record for a freshly aggregated tree.
    pub fn summarize(tree: &ResultTree) -> Self {
        let counts = tree.counts();
        Self {
            total: counts.total(),
            failed: counts.failed,
            skipped: counts.skipped,
            inline_tree: None,
        }
    }

    /// Returns true if this record carries the legacy inline tree.
    pub fn is_legacy(&self) -> bool {
        self.inline_tree.is_some()
    }

    /// Brings a freshly deserialized record into a consistent state.
    ///
    /// A legacy inline tree is re-tallied, gets fallback child names if it
    /// predates the naming map, and its counters replace the stored summary.
    /// The on-disk record is left as-is.
    pub fn normalize(&mut self) {
        if let Some(tree) = self.inline_tree.as_mut() {
            tree.ensure_names();
            tree.tally();
            let counts = tree.counts();
            self.total = counts.total();
            self.failed = counts.failed;
            self.skipped = counts.skipped;
        }
    }
}
