use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tag carried by synthetic headers emitted by the repeat collapser.
pub const TAG_GROUP_HEADER: &str = "group_header";
/// Tag carried by lines that contain a notification marker.
pub const TAG_NOTIFICATION: &str = "notification";

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Unknown,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Unknown,
    ];

    /// Lower is more severe.
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warning => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
            LogLevel::Unknown => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warning => "Warning",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Unknown => "-",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One parsed log line, or a synthetic collapse header.
///
/// Records are never mutated after creation and are shared as `Arc<LogRecord>`
/// between the installed record list and every display list built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LogLevel,
    /// Display content, possibly cut at the truncation threshold.
    pub content: String,
    pub tags: BTreeSet<String>,
    /// The line exactly as read. Empty for synthetic headers.
    pub raw: String,
    pub truncated: bool,
    /// Number of members following this record when it is a collapse header.
    pub member_count: Option<usize>,
}

impl LogRecord {
    pub fn header(label: &str, level: LogLevel, member_count: usize) -> Self {
        let mut tags = BTreeSet::new();
        tags.insert(TAG_GROUP_HEADER.to_string());
        Self {
            timestamp: String::new(),
            level,
            content: format!("[{}] {} 件のログ", label, member_count),
            tags,
            raw: String::new(),
            truncated: false,
            member_count: Some(member_count),
        }
    }

    pub fn is_group_header(&self) -> bool {
        self.member_count.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_carries_count_in_content_and_field() {
        let header = LogRecord::header("Network", LogLevel::Info, 5);
        assert_eq!(header.content, "[Network] 5 件のログ");
        assert_eq!(header.member_count, Some(5));
        assert!(header.has_tag(TAG_GROUP_HEADER));
        assert!(header.timestamp.is_empty());
    }

    #[test]
    fn test_severity_orders_error_first() {
        let mut levels = LogLevel::ALL.to_vec();
        levels.reverse();
        levels.sort_by_key(|l| l.severity());
        assert_eq!(levels[0], LogLevel::Error);
        assert_eq!(levels[4], LogLevel::Unknown);
    }
}
