use crate::error::ConfigError;
use crate::utils::contains_ignore_case;
use regex::{Regex, RegexBuilder};

/// Pattern matching strategy for the configurable keyword tables.
///
/// Every table lookup in the parser is case-insensitive, so plain patterns
/// ignore case and regex patterns are compiled with the case-insensitive flag.
#[derive(Debug, Clone)]
pub enum PatternMatcher {
    /// Plain substring matching, case-insensitive.
    Plain(String),
    /// Regular expression matching.
    Regex(Regex),
}

impl PatternMatcher {
    /// Builds a matcher from a config entry.
    pub fn new(pattern: &str, regex: bool) -> Result<Self, ConfigError> {
        if regex {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(PatternMatcher::Regex)
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
        } else {
            Ok(PatternMatcher::Plain(pattern.to_string()))
        }
    }

    /// Checks if the pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            PatternMatcher::Plain(p) => contains_ignore_case(text, p),
            PatternMatcher::Regex(r) => r.is_match(text),
        }
    }
}
