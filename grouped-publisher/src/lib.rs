// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Aggregation, persistence and history for labeled test-result groups.
//!
//! This crate is the engine behind a labeled test-report publisher for a CI
//! server. For each configured (parser, file mask, label) triple it invokes
//! the matching result-format parser, files the parsed results under their
//! labels, and rolls everything into a
//! [`ResultTree`](grouped_results::ResultTree). The tree is persisted as a
//! side file next to the build and reloaded on demand through a bounded
//! cache, and the history module walks prior builds for diffs and trend
//! series.
//!
//! Parsers themselves live in format-specific plugins; this crate only
//! depends on the [`ResultParser`](parser::ResultParser) capability and a
//! string-keyed [`ParserRegistry`](parser::ParserRegistry).

pub mod config;
pub mod errors;
pub mod history;
pub mod parser;
pub mod publish;
pub mod record;
pub mod store;
