// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Rollup counters for a result, group or tree.
///
/// The total is always the sum of the three counters; it is exposed as
/// [`ResultCounts::total`] rather than stored so the invariant cannot drift.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultCounts {
    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The accumulated execution time.
    pub duration: Duration,
}

impl ResultCounts {
    /// Creates counts with the given counters and a zero duration.
    pub fn new(passed: usize, failed: usize, skipped: usize) -> Self {
        Self {
            passed,
            failed,
            skipped,
            duration: Duration::ZERO,
        }
    }

    /// The total number of tests: passed + failed + skipped.
    pub fn total(self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Returns true if nothing failed and nothing was skipped.
    pub fn is_passed(self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Adds another set of counts into this one.
    pub fn accumulate(&mut self, other: ResultCounts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.duration += other.duration;
    }

    /// Computes the build-over-build change relative to `previous`.
    ///
    /// With no previous counts the baseline is zero, so every delta equals
    /// the corresponding current count.
    pub fn delta_from(self, previous: Option<ResultCounts>) -> CountsDelta {
        let previous = previous.unwrap_or_default();
        CountsDelta {
            passed: self.passed as i64 - previous.passed as i64,
            failed: self.failed as i64 - previous.failed as i64,
            skipped: self.skipped as i64 - previous.skipped as i64,
            total: self.total() as i64 - previous.total() as i64,
        }
    }
}

impl fmt::Display for ResultCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}

/// The signed change in counters between two builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountsDelta {
    /// Change in the number of passed tests.
    pub passed: i64,

    /// Change in the number of failed tests.
    pub failed: i64,

    /// Change in the number of skipped tests.
    pub skipped: i64,

    /// Change in the total number of tests.
    pub total: i64,
}
