use crate::group::GroupIndex;
use crate::record::{LogLevel, LogRecord};
use std::sync::Arc;

/// Counts over the installed records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    /// Indexed by [`LogLevel::severity`].
    pub per_level: [usize; 5],
    pub notifications: usize,
    pub groups: usize,
    /// Records cut at the truncation threshold.
    pub truncated: usize,
}

impl Statistics {
    pub fn collect(records: &[Arc<LogRecord>], groups: &GroupIndex) -> Self {
        let mut stats = Statistics {
            total: records.len(),
            notifications: groups.total_messages(),
            groups: groups.len(),
            ..Statistics::default()
        };
        for record in records {
            stats.per_level[record.level.severity() as usize] += 1;
            if record.truncated {
                stats.truncated += 1;
            }
        }
        stats
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.per_level[level.severity() as usize]
    }

    /// Share of `level` among all records, in percent.
    pub fn percent(&self, level: LogLevel) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(level) as f64 * 100.0 / self.total as f64
    }
}
