// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The aggregation step: parser dispatch and tree assembly.

use crate::{
    config::{rollup_configs, validate_label, TestGroupConfig},
    errors::ConfigError,
    parser::{ParseContext, ParserRegistry},
};
use grouped_results::{BuildHealth, LabelGroup, ParsedResult, ResultId, ResultTree};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Runs configured parsers over a build's result files and folds their
/// output into a [`ResultTree`].
///
/// One publisher instance corresponds to one job's configuration and is
/// reused across that job's builds. Construction validates the
/// configuration; a bad configuration never reaches a build.
#[derive(Clone, Debug)]
pub struct TestGroupPublisher {
    configs: Vec<TestGroupConfig>,
}

impl TestGroupPublisher {
    /// Creates a publisher from configuration triples.
    ///
    /// Fails if the list is empty or any label is invalid.
    pub fn new(configs: Vec<TestGroupConfig>) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::NoConfigs);
        }
        for config in &configs {
            validate_label(config.label())?;
        }
        Ok(Self { configs })
    }

    /// The configured triples, as supplied (before rollup).
    pub fn configs(&self) -> &[TestGroupConfig] {
        &self.configs
    }

    /// Aggregates one build's test results.
    ///
    /// Configurations sharing a (parser, label) pair are rolled up first so
    /// each parser runs at most once per label. Parsers run sequentially;
    /// any single configuration's failure (unknown parser, parse error, no
    /// results) is logged and skipped while the rest continue. A build where
    /// nothing parsed yields a valid, empty tree: an empty report is a
    /// legitimate terminal state, not an error.
    pub fn publish(&self, registry: &ParserRegistry, cx: &ParseContext<'_>) -> ResultTree {
        info!("analyzing test results for build {}", cx.build);

        let configs = rollup_configs(&self.configs);
        let mut results_by_label: IndexMap<String, Vec<ParsedResult>> = IndexMap::new();
        let mut names: HashMap<ResultId, String> = HashMap::new();

        for config in &configs {
            let Some(parser) = registry.get(config.parser()) else {
                warn!("couldn't find a parser for `{}`; skipping {config}", config.parser());
                continue;
            };

            let result = match parser.parse(config.file_mask(), cx) {
                Ok(Some(result)) => result,
                Ok(None) => {
                    warn!(
                        "parser `{}` found no results for `{}`; skipping {config}",
                        config.parser(),
                        config.file_mask()
                    );
                    continue;
                }
                Err(error) => {
                    warn!("while processing {config}: {error}; skipping");
                    continue;
                }
            };

            debug!(
                "parsed `{}` results for label `{}`: {}",
                config.parser(),
                config.label(),
                result.counts()
            );
            names.insert(result.id(), registry.display_name_for(config.parser()).to_owned());
            results_by_label
                .entry(config.label().to_owned())
                .or_default()
                .push(result);
        }

        let mut tree = ResultTree::new();
        for (label, results) in results_by_label {
            let mut group = LabelGroup::with_results(label, results);
            group.set_name_map(&names);
            tree.add_group(group);
        }
        tree.set_owner(cx.build);
        tree.tally();

        info!("test results parsed for build {}: {}", cx.build, tree.counts());
        tree
    }
}

/// Folds every result's health override together with the build's current
/// status and returns the worst.
///
/// Parsers can only make a build worse than it currently is, never better;
/// the caller applies the returned value as the build's new status.
pub fn worst_health(tree: &ResultTree, current: BuildHealth) -> BuildHealth {
    tree.flatten()
        .filter_map(|result| result.health())
        .fold(current, BuildHealth::worst)
}
