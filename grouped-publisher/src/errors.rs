// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the publisher.

use camino::Utf8PathBuf;
use grouped_results::BuildNumber;
use std::io;
use thiserror::Error;

/// An error in the publisher's configuration.
///
/// Configuration errors are fatal at construction time: a bad configuration
/// is rejected before any build runs.
#[derive(Clone, Debug, Error)]
pub enum ConfigError {
    /// No configuration triples were supplied.
    #[error("no test group configurations were supplied")]
    NoConfigs,

    /// A label did not match the allowed grammar.
    #[error("invalid label `{label}`: labels must be non-empty and contain only letters, digits and spaces")]
    InvalidLabel {
        /// The offending label.
        label: String,
    },
}

/// An error while invoking a result-format parser.
///
/// The publisher downgrades these to a warning and skips the offending
/// configuration; other configurations continue to be processed.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Result files could not be read.
    #[error("failed to read test results matching `{file_mask}`")]
    Read {
        /// The file mask that was being read.
        file_mask: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The result files did not match the expected format.
    #[error("malformed test results: {message}")]
    Malformed {
        /// A description of the problem.
        message: String,
    },

    /// Any other parser-specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// An error while persisting a result tree.
///
/// Write failures are surfaced to the caller so it can report them on the
/// build's listener stream; they do not fail the surrounding build.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The builds directory could not be created.
    #[error("failed to create results directory `{dir}`")]
    CreateDir {
        /// The directory being created.
        dir: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The result tree could not be serialized.
    #[error("failed to serialize test results for build {build}")]
    Serialize {
        /// The build whose results were being serialized.
        build: BuildNumber,
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The side file could not be written.
    #[error("failed to write test results to `{path}`")]
    Write {
        /// The side-file path.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },
}
