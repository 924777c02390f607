// Copyright (c) The grouped-tests Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pluggable parser capability and the registry the publisher resolves
//! parsers from.

use crate::errors::ParseError;
use camino::Utf8Path;
use grouped_results::{BuildNumber, ParsedResult};
use indexmap::IndexMap;
use std::fmt;
use tracing::warn;

/// Everything a parser gets to see about the build it is parsing for.
#[derive(Clone, Copy, Debug)]
pub struct ParseContext<'a> {
    /// The workspace directory file masks are resolved against.
    pub workspace: &'a Utf8Path,

    /// The build being aggregated.
    pub build: BuildNumber,
}

/// A result-format parser.
///
/// Each supported test-result format (JUnit XML, CppUnit XML, ...) ships a
/// plugin implementing this trait; the publisher only ever talks to parsers
/// through the registry, keyed by [`id`](ResultParser::id). Returning
/// `Ok(None)` means the mask matched nothing parseable, which the publisher
/// treats the same as an error: log and skip that configuration.
pub trait ResultParser: Send + Sync {
    /// The identifier configurations refer to this parser by.
    fn id(&self) -> &str;

    /// A short human-friendly name, used when naming parsed results.
    ///
    /// Defaults to the raw identifier.
    fn display_name(&self) -> &str {
        self.id()
    }

    /// Parses the result files matching `file_mask`.
    ///
    /// `file_mask` may be a comma-joined list of masks after rollup.
    fn parse(
        &self,
        file_mask: &str,
        cx: &ParseContext<'_>,
    ) -> Result<Option<ParsedResult>, ParseError>;
}

/// The set of registered result-format parsers, keyed by identifier.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: IndexMap<String, Box<dyn ResultParser>>,
}

impl ParserRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parser under its own identifier, replacing any previous
    /// parser with the same identifier.
    pub fn register(&mut self, parser: Box<dyn ResultParser>) {
        let id = parser.id().to_owned();
        if self.parsers.insert(id.clone(), parser).is_some() {
            warn!("replacing previously registered parser `{id}`");
        }
    }

    /// Resolves a parser by identifier.
    pub fn get(&self, id: &str) -> Option<&dyn ResultParser> {
        self.parsers.get(id).map(|parser| &**parser)
    }

    /// The registered identifiers, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(String::as_str)
    }

    /// The display name for `id`, falling back to the raw identifier if no
    /// such parser is registered.
    pub fn display_name_for<'a>(&'a self, id: &'a str) -> &'a str {
        match self.get(id) {
            Some(parser) => parser.display_name(),
            None => id,
        }
    }

    /// The number of registered parsers.
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Returns true if no parsers are registered.
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullParser {
        id: String,
        display: Option<String>,
    }

    impl ResultParser for NullParser {
        fn id(&self) -> &str {
            &self.id
        }

        fn display_name(&self) -> &str {
            self.display.as_deref().unwrap_or_else(|| self.id())
        }

        fn parse(
            &self,
            _file_mask: &str,
            _cx: &ParseContext<'_>,
        ) -> Result<Option<ParsedResult>, ParseError> {
            Ok(None)
        }
    }

    #[test]
    fn registry_resolves_by_id() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(NullParser {
            id: "junit".to_owned(),
            display: Some("JUnit".to_owned()),
        }));
        registry.register(Box::new(NullParser {
            id: "cppunit".to_owned(),
            display: None,
        }));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("junit").is_some());
        assert!(registry.get("nunit").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), ["junit", "cppunit"]);
    }

    #[test]
    fn display_name_falls_back_to_raw_id() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(NullParser {
            id: "junit".to_owned(),
            display: Some("JUnit".to_owned()),
        }));
        assert_eq!(registry.display_name_for("junit"), "JUnit");
        assert_eq!(registry.display_name_for("unknown"), "unknown");
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(NullParser {
            id: "junit".to_owned(),
            display: None,
        }));
        registry.register(Box::new(NullParser {
            id: "junit".to_owned(),
            display: Some("JUnit 5".to_owned()),
        }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_name_for("junit"), "JUnit 5");
    }
}
