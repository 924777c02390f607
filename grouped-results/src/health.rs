// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The overall health a build can be in, ordered from best to worst.
///
/// Parsed results may carry a health override (for example a parser that
/// treats any failure as build-breaking). Aggregation folds these together
/// with the build's current status, and the combined health may only ever
/// downgrade the build, never upgrade it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildHealth {
    /// The build succeeded.
    Success,
    /// The build completed but is unstable (e.g. test failures).
    Unstable,
    /// The build failed.
    Failure,
    /// The build was aborted.
    Aborted,
}

impl BuildHealth {
    /// Returns the worse of two health values.
    pub fn worst(self, other: BuildHealth) -> BuildHealth {
        self.max(other)
    }

    /// Returns true if `self` is worse than `other`.
    pub fn is_worse_than(self, other: BuildHealth) -> bool {
        self > other
    }
}

impl fmt::Display for BuildHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Unstable => "unstable",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}
