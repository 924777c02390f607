// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration triples and the rollup that merges them before dispatch.

use crate::errors::ConfigError;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};

static VALID_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z0-9 ]+$").unwrap());

/// Checks a label against the allowed grammar: non-empty, letters, digits
/// and spaces only.
pub fn validate_label(label: &str) -> Result<(), ConfigError> {
    if VALID_LABEL.is_match(label) {
        Ok(())
    } else {
        Err(ConfigError::InvalidLabel {
            label: label.to_owned(),
        })
    }
}

/// The association between a result-file mask, the parser to invoke on it,
/// and the label (aka phase) to file the results under.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestGroupConfig {
    parser: String,
    file_mask: String,
    label: String,
}

impl TestGroupConfig {
    /// Creates a configuration triple, validating the label.
    pub fn new(
        parser: impl Into<String>,
        file_mask: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let label = label.into();
        validate_label(&label)?;
        Ok(Self {
            parser: parser.into(),
            file_mask: file_mask.into(),
            label,
        })
    }

    /// The identifier of the parser to invoke.
    pub fn parser(&self) -> &str {
        &self.parser
    }

    /// The file mask handed to the parser. After rollup this may be a
    /// comma-joined union of several masks.
    pub fn file_mask(&self) -> &str {
        &self.file_mask
    }

    /// The label the parsed results are filed under.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for TestGroupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{label: {}, file mask: {}, parser: {}}}",
            self.label, self.file_mask, self.parser
        )
    }
}

/// Merges configurations so that there is at most one per (parser, label)
/// pair.
///
/// All triples sharing a pair collapse into one whose file mask is the
/// comma-joined union of theirs. Output order is first-seen order of label,
/// then of parser within the label. Rollup runs before any parser is
/// dispatched so that no parser is invoked twice for one label.
pub fn rollup_configs(configs: &[TestGroupConfig]) -> Vec<TestGroupConfig> {
    let mut merged: IndexMap<&str, IndexMap<&str, String>> = IndexMap::new();
    for config in configs {
        if config.file_mask.is_empty() {
            continue;
        }
        let masks = merged.entry(config.label()).or_default();
        match masks.get_mut(config.parser()) {
            Some(mask) => {
                mask.push(',');
                mask.push_str(config.file_mask());
            }
            None => {
                masks.insert(config.parser(), config.file_mask().to_owned());
            }
        }
    }

    merged
        .into_iter()
        .flat_map(|(label, masks)| {
            masks.into_iter().map(move |(parser, file_mask)| TestGroupConfig {
                parser: parser.to_owned(),
                file_mask,
                label: label.to_owned(),
            })
        })
        .collect()
}
