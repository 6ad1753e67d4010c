use crate::collapse::{DisplayList, collapse};
use crate::error::ConfigError;
use crate::record::{LogLevel, LogRecord};
use crate::utils::contains_ignore_case;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Records are filtered in chunks of this size; progress is reported per chunk.
const FILTER_CHUNK: usize = 4096;

/// Set of levels shown by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSet(u8);

impl LevelSet {
    pub fn all() -> Self {
        LevelSet::ALL_BITS
    }

    pub fn empty() -> Self {
        LevelSet(0)
    }

    const ALL_BITS: LevelSet = LevelSet(0b1_1111);

    fn bit(level: LogLevel) -> u8 {
        1 << level.severity()
    }

    pub fn contains(&self, level: LogLevel) -> bool {
        self.0 & Self::bit(level) != 0
    }

    pub fn insert(&mut self, level: LogLevel) {
        self.0 |= Self::bit(level);
    }

    pub fn remove(&mut self, level: LogLevel) {
        self.0 &= !Self::bit(level);
    }

    pub fn toggle(&mut self, level: LogLevel) {
        self.0 ^= Self::bit(level);
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL_BITS
    }
}

impl FromIterator<LogLevel> for LevelSet {
    fn from_iter<I: IntoIterator<Item = LogLevel>>(iter: I) -> Self {
        let mut set = LevelSet::empty();
        for level in iter {
            set.insert(level);
        }
        set
    }
}

/// What the display list shows. Always valid once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    levels: LevelSet,
    search_text: Option<String>,
    collapse_repeats: bool,
    collapse_threshold: usize,
}

impl FilterConfig {
    pub fn new(
        levels: LevelSet,
        search_text: Option<String>,
        collapse_repeats: bool,
        collapse_threshold: usize,
    ) -> Result<Self, ConfigError> {
        if collapse_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(collapse_threshold));
        }
        Ok(Self {
            levels,
            search_text: search_text.filter(|s| !s.is_empty()),
            collapse_repeats,
            collapse_threshold,
        })
    }

    pub fn levels(&self) -> LevelSet {
        self.levels
    }

    pub fn search_text(&self) -> Option<&str> {
        self.search_text.as_deref()
    }

    pub fn collapse_repeats(&self) -> bool {
        self.collapse_repeats
    }

    pub fn collapse_threshold(&self) -> usize {
        self.collapse_threshold
    }

    pub fn with_levels(mut self, levels: LevelSet) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_search(mut self, search_text: Option<String>) -> Self {
        self.search_text = search_text.filter(|s| !s.is_empty());
        self
    }

    pub fn with_collapse(mut self, collapse_repeats: bool) -> Self {
        self.collapse_repeats = collapse_repeats;
        self
    }

    /// True when `record` passes the level and search predicates.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if !self.levels.contains(record.level) {
            return false;
        }
        match &self.search_text {
            Some(needle) => contains_ignore_case(&record.raw, needle),
            None => true,
        }
    }
}

/// Builds display lists from the installed records.
pub struct FilterPipeline;

impl FilterPipeline {
    /// Filters `records` then collapses repeats. Pure; file order is kept.
    pub fn apply(records: &[Arc<LogRecord>], config: &FilterConfig) -> DisplayList {
        Self::apply_with_progress(records, config, |_| {})
    }

    /// Like [`apply`](Self::apply), reporting the number of records
    /// examined after each chunk.
    pub fn apply_with_progress(
        records: &[Arc<LogRecord>],
        config: &FilterConfig,
        on_progress: impl Fn(usize) + Sync,
    ) -> DisplayList {
        let examined = AtomicUsize::new(0);
        let chunks: Vec<Vec<Arc<LogRecord>>> = records
            .par_chunks(FILTER_CHUNK)
            .map(|chunk| {
                let kept: Vec<Arc<LogRecord>> = chunk
                    .iter()
                    .filter(|r| config.matches(r))
                    .cloned()
                    .collect();
                let done = examined.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
                on_progress(done);
                kept
            })
            .collect();
        let filtered: Vec<Arc<LogRecord>> = chunks.into_iter().flatten().collect();

        debug!(
            "Filtered {} of {} records (levels={:?}, search={:?})",
            filtered.len(),
            records.len(),
            config.levels,
            config.search_text
        );

        if config.collapse_repeats {
            collapse(filtered, config.collapse_threshold)
        } else {
            DisplayList::plain(filtered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_parser;

    fn sample() -> Vec<Arc<LogRecord>> {
        test_parser().parse_lines(&[
            "2024.01.01 10:00:00 Error      -  [Net] connection lost",
            "2024.01.01 10:00:01 Log        -  [Net] retrying",
            "2024.01.01 10:00:02 Warning    -  [Disk] almost full",
            "2024.01.01 10:00:03 Log        -  Ärger im Paradies",
            "2024.01.01 10:00:04 Debug      -  tick",
        ])
    }

    fn config(levels: LevelSet, search: Option<&str>) -> FilterConfig {
        FilterConfig::new(levels, search.map(str::to_string), false, 3).unwrap()
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let err = FilterConfig::new(LevelSet::all(), None, true, 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold(0)));
    }

    #[test]
    fn test_level_filter() {
        let levels: LevelSet = [LogLevel::Error, LogLevel::Warning].into_iter().collect();
        let list = FilterPipeline::apply(&sample(), &config(levels, None));
        let contents: Vec<&str> = list.records().iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["[Net] connection lost", "[Disk] almost full"]);
    }

    #[test]
    fn test_search_is_case_insensitive_and_unicode_aware() {
        let list = FilterPipeline::apply(&sample(), &config(LevelSet::all(), Some("NET")));
        assert_eq!(list.len(), 2);

        let list = FilterPipeline::apply(&sample(), &config(LevelSet::all(), Some("ärger")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_search_looks_at_raw_line() {
        let list = FilterPipeline::apply(&sample(), &config(LevelSet::all(), Some("10:00:04")));
        assert_eq!(list.len(), 1);
        assert_eq!(list.records()[0].content, "tick");
    }

    #[test]
    fn test_empty_search_means_no_search() {
        let config = config(LevelSet::all(), Some(""));
        assert_eq!(config.search_text(), None);
        assert_eq!(FilterPipeline::apply(&sample(), &config).len(), 5);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let records = sample();
        let config = FilterConfig::new(LevelSet::all(), None, true, 2).unwrap();
        let a = FilterPipeline::apply(&records, &config);
        let b = FilterPipeline::apply(&records, &config);
        assert_eq!(a.records(), b.records());
        assert_eq!(a.spans(), b.spans());
        assert_eq!(a.spans().len(), 1);
    }

    #[test]
    fn test_order_is_preserved_across_chunks() {
        let lines: Vec<String> = (0..FILTER_CHUNK * 3 + 7)
            .map(|i| format!("line {} {}", i, if i % 2 == 0 { "error" } else { "info" }))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let records = test_parser().parse_lines(&refs);
        let levels: LevelSet = [LogLevel::Error].into_iter().collect();
        let list = FilterPipeline::apply(&records, &config(levels, None));
        assert_eq!(list.len(), (FILTER_CHUNK * 3 + 8) / 2);
        for (n, record) in list.records().iter().enumerate() {
            assert!(record.content.starts_with(&format!("line {} ", n * 2)));
        }
    }

    #[test]
    fn test_level_set_toggle() {
        let mut set = LevelSet::all();
        set.toggle(LogLevel::Debug);
        assert!(!set.contains(LogLevel::Debug));
        assert!(!set.is_all());
        set.toggle(LogLevel::Debug);
        assert!(set.is_all());
    }
}
