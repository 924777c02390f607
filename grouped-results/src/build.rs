// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of a build within one project's build sequence.
///
/// Build numbers are assigned by the host CI server and increase over time,
/// but the sequence may have gaps (deleted builds), so navigation goes
/// through the host's view of the chain rather than arithmetic on the
/// number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BuildNumber(u32);

impl BuildNumber {
    /// Creates a new `BuildNumber`.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// Returns the raw build number.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for BuildNumber {
    fn from(number: u32) -> Self {
        Self(number)
    }
}
