use crate::matcher::PatternMatcher;
use crate::record::{LogLevel, LogRecord, TAG_NOTIFICATION};
use crate::utils::truncate_chars;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

/// Appended to content cut at the truncation threshold.
pub const ELISION_SUFFIX: &str = " …";

/// `2024.01.15 10:30:45 Warning    -  message`
static DOTTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}\.\d{2}\.\d{2} \d{2}:\d{2}:\d{2})\s+(\w+)\s+-\s*(.*)$").unwrap()
});

/// `[2024-01-15 10:30:45] message`
static BRACKETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{4}[-./]\d{2}[-./]\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?)\]\s*(.*)$")
        .unwrap()
});

/// `2024-01-15T10:30:45.123+02:00 message`
static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?)(?:\s+(.*))?$",
    )
    .unwrap()
});

/// A leading level token such as `[Error] `, `INFO - ` or `warn: `.
static LEVEL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\[(\w+)\]|(\w+)(?:\s*[-:])?)\s+").unwrap());

const LEVEL_WORDS: &[&str] = &[
    "error", "err", "exception", "fatal", "warning", "warn", "info", "debug", "trace",
];

/// One row of the level classification table.
#[derive(Debug, Clone)]
pub struct LevelPattern {
    pub matcher: PatternMatcher,
    pub level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub truncate: bool,
    /// Maximum content length in characters before truncation.
    pub truncate_threshold: usize,
    /// Lines containing this marker are tagged as notifications.
    pub notification_marker: String,
}

/// Turns raw lines into [`LogRecord`]s. Parsing never fails.
#[derive(Debug, Clone)]
pub struct LineParser {
    levels: Arc<Vec<LevelPattern>>,
    options: ParserOptions,
}

impl LineParser {
    pub fn new(levels: Vec<LevelPattern>, options: ParserOptions) -> Self {
        Self {
            levels: Arc::new(levels),
            options,
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parses a single line into a record.
    pub fn parse(&self, raw_line: &str) -> LogRecord {
        let line = raw_line.trim_end_matches(['\r', '\n']);
        let (timestamp, body) = split_timestamp(line);
        let body = body.trim();

        let full_content = if timestamp.is_empty() { line.trim() } else { body };

        let (content, truncated) = if self.options.truncate
            && full_content.chars().count() > self.options.truncate_threshold
        {
            let cut = truncate_chars(full_content, self.options.truncate_threshold);
            (format!("{}{}", cut, ELISION_SUFFIX), true)
        } else {
            (full_content.to_string(), false)
        };

        let mut tags = BTreeSet::new();
        if !self.options.notification_marker.is_empty()
            && line.contains(&self.options.notification_marker)
        {
            tags.insert(TAG_NOTIFICATION.to_string());
        }

        LogRecord {
            timestamp: timestamp.to_string(),
            level: self.classify(line),
            content,
            tags,
            raw: line.to_string(),
            truncated,
            member_count: None,
        }
    }

    /// First table entry matching anywhere in the line wins.
    pub fn classify(&self, line: &str) -> LogLevel {
        self.levels
            .iter()
            .find(|entry| entry.matcher.matches(line))
            .map(|entry| entry.level)
            .unwrap_or(LogLevel::Unknown)
    }

    /// Parses every non-blank line of `text`, in parallel, keeping file order.
    pub fn parse_text(&self, text: &str) -> Vec<Arc<LogRecord>> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        self.parse_lines(&lines)
    }

    pub fn parse_lines(&self, lines: &[&str]) -> Vec<Arc<LogRecord>> {
        lines
            .par_iter()
            .map(|line| Arc::new(self.parse(line)))
            .collect()
    }
}

/// Returns the leading timestamp (empty when none is recognised) and the rest
/// of the line with any leading level token removed.
pub fn split_timestamp(line: &str) -> (&str, &str) {
    if let Some(caps) = DOTTED_RE.captures(line) {
        let ts = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(3).map_or("", |m| m.as_str());
        return (ts, rest);
    }

    if let Some(caps) = BRACKETED_RE.captures(line) {
        let ts = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        return (ts, strip_level_token(rest));
    }

    if let Some(caps) = ISO_RE.captures(line) {
        let ts = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        return (ts, strip_level_token(rest));
    }

    ("", line)
}

/// Leading timestamp of a line, if any.
pub fn extract_timestamp(line: &str) -> Option<&str> {
    let (ts, _) = split_timestamp(line);
    (!ts.is_empty()).then_some(ts)
}

fn strip_level_token(rest: &str) -> &str {
    let Some(caps) = LEVEL_TOKEN_RE.captures(rest) else {
        return rest;
    };
    let word = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
    if LEVEL_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        let end = caps.get(0).map_or(0, |m| m.end());
        &rest[end..]
    } else {
        rest
    }
}

#[cfg(test)]
pub(crate) fn test_parser() -> LineParser {
    crate::config::Config::default()
        .build_parser()
        .expect("default config builds a parser")
}
