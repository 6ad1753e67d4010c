use crate::parser::extract_timestamp;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Progress is reported every this many markers.
pub const PROGRESS_BATCH: usize = 1000;

/// Upper bound for an incomplete payload carried between incremental reads.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 256 * 1024;

const LEGACY_PREFIX: &str = "<Notification";

static LEGACY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)^<Notification[^>]*?id: (?P<id>[\w-]+)[^>]*?created at: (?P<created>[^,>]+?)[^>]*?message: "(?P<message>.*?)">"#,
    )
    .unwrap()
});

/// A structured notification found inside the raw log text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationRecord {
    pub id: String,
    pub group_id: String,
    /// Name carried by the payload itself, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Timestamp of the log line that carried the notification.
    pub date: String,
    /// Timestamp stated inside the payload.
    pub created_at: String,
    pub message: String,
}

/// JSON pointer candidates for each extracted field, tried in order.
#[derive(Debug, Clone)]
pub struct FieldPaths {
    pub id: Vec<String>,
    pub group_id: Vec<String>,
    pub group_name: Vec<String>,
    pub created_at: Vec<String>,
    pub message: Vec<String>,
}

impl Default for FieldPaths {
    fn default() -> Self {
        fn paths(p: &[&str]) -> Vec<String> {
            p.iter().map(|s| s.to_string()).collect()
        }
        Self {
            id: paths(&["/id", "/notificationId"]),
            group_id: paths(&["/details/groupId", "/groupId", "/details/group_id"]),
            group_name: paths(&["/details/groupName", "/groupName", "/details/group_name"]),
            created_at: paths(&["/created_at", "/createdAt", "/details/createdAt"]),
            message: paths(&["/details/message", "/message"]),
        }
    }
}

/// Keyword rule assigning payloads without a group id to a named group.
#[derive(Debug, Clone)]
pub struct GroupRule {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub also: Vec<String>,
}

impl GroupRule {
    fn matches(&self, message: &str) -> bool {
        self.keywords.iter().any(|k| message.contains(k.as_str()))
            && (self.also.is_empty() || self.also.iter().any(|k| message.contains(k.as_str())))
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub marker: String,
    pub fields: FieldPaths,
    pub group_rules: Vec<GroupRule>,
    pub max_pending_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            marker: crate::config::DEFAULT_NOTIFICATION_MARKER.to_string(),
            fields: FieldPaths::default(),
            group_rules: Vec::new(),
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

/// Result of locating one payload after a marker.
enum PayloadScan {
    /// The payload ends at `end`; `record` is `None` when it failed to decode.
    Complete {
        end: usize,
        record: Result<Option<NotificationRecord>, &'static str>,
    },
    /// The text ends before the payload does.
    Incomplete,
}

#[derive(Debug, Default)]
struct ScanOutcome {
    last_end: usize,
    incomplete_at: Option<usize>,
    malformed: usize,
}

/// Finds notification payloads in raw log text.
#[derive(Debug, Clone)]
pub struct NotificationExtractor {
    config: Arc<ExtractorConfig>,
}

impl NotificationExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Extracts every notification from a complete text.
    pub fn extract(&self, raw_text: &str) -> Vec<NotificationRecord> {
        self.extract_with_progress(raw_text, |_| {})
    }

    /// Like [`extract`](Self::extract), calling `on_progress` with the number
    /// of markers seen every [`PROGRESS_BATCH`] markers.
    pub fn extract_with_progress(
        &self,
        raw_text: &str,
        on_progress: impl FnMut(usize),
    ) -> Vec<NotificationRecord> {
        let mut out = Vec::new();
        let outcome = self.scan(raw_text, 0, true, &mut out, on_progress);
        debug!(
            "Extracted {} notifications, skipped {} malformed payloads",
            out.len(),
            outcome.malformed
        );
        out
    }

    /// Default display name for a group id produced by a keyword rule.
    pub fn default_group_name(&self, group_id: &str) -> Option<&str> {
        self.config
            .group_rules
            .iter()
            .find(|rule| rule.id == group_id)
            .map(|rule| rule.name.as_str())
    }

    /// Derives a group id from the message text.
    pub fn classify_group(&self, message: &str) -> String {
        if let Some(rule) = self.config.group_rules.iter().find(|r| r.matches(message)) {
            return rule.id.clone();
        }

        let prefix: String = message.chars().take(20).collect();
        let mut hasher = DefaultHasher::new();
        prefix.hash(&mut hasher);
        format!("group_other_{:08x}", hasher.finish() & 0xffff_ffff)
    }

    fn scan(
        &self,
        text: &str,
        from: usize,
        at_eof: bool,
        out: &mut Vec<NotificationRecord>,
        mut on_progress: impl FnMut(usize),
    ) -> ScanOutcome {
        let marker = self.config.marker.as_str();
        let mut outcome = ScanOutcome {
            last_end: from,
            ..ScanOutcome::default()
        };
        if marker.is_empty() {
            return outcome;
        }

        let mut pos = from;
        let mut seen = 0usize;
        while let Some(rel) = text[pos..].find(marker) {
            let marker_at = pos + rel;
            let payload_start = marker_at + marker.len();
            seen += 1;
            if seen % PROGRESS_BATCH == 0 {
                on_progress(seen);
            }

            match self.read_payload(text, marker_at, payload_start) {
                PayloadScan::Complete { end, record } => {
                    match record {
                        Ok(Some(record)) => out.push(record),
                        Ok(None) => {}
                        Err(reason) => {
                            outcome.malformed += 1;
                            debug!("Skipping malformed payload at byte {}: {}", marker_at, reason);
                        }
                    }
                    outcome.last_end = end;
                    pos = end;
                }
                PayloadScan::Incomplete if at_eof => {
                    outcome.malformed += 1;
                    debug!("Skipping unterminated payload at byte {}", marker_at);
                    outcome.last_end = payload_start;
                    pos = payload_start;
                }
                PayloadScan::Incomplete => {
                    outcome.incomplete_at = Some(marker_at);
                    break;
                }
            }
        }
        outcome
    }

    fn read_payload(&self, text: &str, marker_at: usize, payload_start: usize) -> PayloadScan {
        // A payload never runs into the next marker.
        let limit = text[payload_start..]
            .find(self.config.marker.as_str())
            .map(|rel| payload_start + rel);
        let window = &text[payload_start..limit.unwrap_or(text.len())];

        let trimmed = window.trim_start();
        let start = payload_start + (window.len() - trimmed.len());

        if trimmed.is_empty() {
            return match limit {
                Some(end) => PayloadScan::Complete {
                    end,
                    record: Err("empty payload"),
                },
                None => PayloadScan::Incomplete,
            };
        }

        let date = line_timestamp(text, marker_at);

        if trimmed.starts_with('{') {
            return match json_object_len(trimmed) {
                Some(len) => PayloadScan::Complete {
                    end: start + len,
                    record: self.decode_json(&trimmed[..len], date).map(Some),
                },
                None => match limit {
                    Some(end) => PayloadScan::Complete {
                        end,
                        record: Err("unbalanced braces"),
                    },
                    None => PayloadScan::Incomplete,
                },
            };
        }

        if trimmed.starts_with(LEGACY_PREFIX) {
            if let Some(caps) = LEGACY_RE.captures(trimmed) {
                let end = start + caps.get(0).map_or(0, |m| m.end());
                let id = caps.name("id").map_or("", |m| m.as_str());
                let created_at = caps.name("created").map_or("", |m| m.as_str()).trim();
                let message = unescape_legacy(caps.name("message").map_or("", |m| m.as_str()));
                if message.trim().is_empty() {
                    return PayloadScan::Complete { end, record: Ok(None) };
                }
                let record = NotificationRecord {
                    id: id.to_string(),
                    group_id: self.classify_group(&message),
                    group_name: None,
                    date,
                    created_at: created_at.to_string(),
                    message,
                };
                return PayloadScan::Complete {
                    end,
                    record: Ok(Some(record)),
                };
            }

            return match (limit, trimmed.find('\n')) {
                (Some(end), _) => PayloadScan::Complete {
                    end,
                    record: Err("unrecognised notification fields"),
                },
                (None, Some(nl)) => PayloadScan::Complete {
                    end: start + nl,
                    record: Err("unrecognised notification fields"),
                },
                (None, None) => PayloadScan::Incomplete,
            };
        }

        // `<Noti` at the end of a chunk may still become a legacy payload.
        if limit.is_none() && !trimmed.contains('\n') && LEGACY_PREFIX.starts_with(trimmed) {
            return PayloadScan::Incomplete;
        }

        PayloadScan::Complete {
            end: start,
            record: Err("no payload after marker"),
        }
    }

    fn decode_json(&self, payload: &str, date: String) -> Result<NotificationRecord, &'static str> {
        let value: Value = serde_json::from_str(payload).map_err(|_| "invalid JSON")?;
        if !value.is_object() {
            return Err("payload is not an object");
        }

        let fields = &self.config.fields;
        let message = lookup(&value, &fields.message).unwrap_or_default();
        let group_id = lookup(&value, &fields.group_id)
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| self.classify_group(&message));

        Ok(NotificationRecord {
            id: lookup(&value, &fields.id).unwrap_or_default(),
            group_name: lookup(&value, &fields.group_name).filter(|n| !n.is_empty()),
            group_id,
            date,
            created_at: lookup(&value, &fields.created_at).unwrap_or_default(),
            message,
        })
    }
}

/// Extractor that remembers where the previous chunk stopped, so each call
/// only scans text it has not seen and never re-emits a record.
#[derive(Debug, Clone)]
pub struct IncrementalExtractor {
    extractor: NotificationExtractor,
    /// Tail of the previous chunk that may still hold an unfinished payload.
    carry: String,
    /// Offset into `carry` before which every marker was already handled.
    skip: usize,
}

impl IncrementalExtractor {
    pub fn new(extractor: NotificationExtractor) -> Self {
        Self {
            extractor,
            carry: String::new(),
            skip: 0,
        }
    }

    pub fn extractor(&self) -> &NotificationExtractor {
        &self.extractor
    }

    /// Extracts notifications completed by `new_text`.
    pub fn feed(&mut self, new_text: &str) -> Vec<NotificationRecord> {
        self.feed_with_progress(new_text, |_| {})
    }

    pub fn feed_with_progress(
        &mut self,
        new_text: &str,
        on_progress: impl FnMut(usize),
    ) -> Vec<NotificationRecord> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(new_text);

        let mut out = Vec::new();
        let outcome = self.extractor.scan(&text, self.skip, false, &mut out, on_progress);

        let (keep_from, skip_abs) = match outcome.incomplete_at {
            Some(at) => (line_start(&text, at), at),
            None => {
                let partial = text.rfind('\n').map_or(0, |nl| nl + 1);
                (partial, outcome.last_end.max(partial))
            }
        };

        if text.len() - keep_from > self.extractor.config.max_pending_bytes {
            warn!(
                "Dropping {} bytes of unterminated notification payload",
                text.len() - keep_from
            );
            self.carry.clear();
            self.skip = 0;
        } else {
            self.carry = text[keep_from..].to_string();
            self.skip = skip_abs - keep_from;
        }
        out
    }

    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }
}

fn line_start(text: &str, at: usize) -> usize {
    text[..at].rfind('\n').map_or(0, |nl| nl + 1)
}

fn line_timestamp(text: &str, marker_at: usize) -> String {
    let line = &text[line_start(text, marker_at)..marker_at];
    extract_timestamp(line).unwrap_or_default().to_string()
}

/// Byte length of the balanced JSON object at the start of `text`, ignoring
/// braces inside strings. `None` when the text ends first.
fn json_object_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn lookup(value: &Value, pointers: &[String]) -> Option<String> {
    pointers.iter().find_map(|p| match value.pointer(p)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

fn unescape_legacy(message: &str) -> String {
    message
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "")
        .replace("\\\"", "\"")
}

#[cfg(test)]
pub(crate) fn test_extractor() -> NotificationExtractor {
    NotificationExtractor::new(crate::config::Config::default().extractor_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_LINE: &str = r#"2024.05.01 20:00:00 Log        -  Received Notification: {"id":"not_1","created_at":"2024-05-01T19:59:58Z","details":{"groupId":"grp_a","groupName":"Tea Club","message":"Meeting at 9"}}"#;

    #[test]
    fn test_extracts_json_payload_fields() {
        let records = test_extractor().extract(JSON_LINE);
        assert_eq!(records.len(), 1);
        let n = &records[0];
        assert_eq!(n.id, "not_1");
        assert_eq!(n.group_id, "grp_a");
        assert_eq!(n.group_name.as_deref(), Some("Tea Club"));
        assert_eq!(n.date, "2024.05.01 20:00:00");
        assert_eq!(n.created_at, "2024-05-01T19:59:58Z");
        assert_eq!(n.message, "Meeting at 9");
    }

    #[test]
    fn test_malformed_payload_does_not_block_next() {
        let text = format!(
            "2024.05.01 19:00:00 Log - Received Notification: {{\"id\": not-json}}\n{}\n",
            JSON_LINE
        );
        let records = test_extractor().extract(&text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "not_1");
    }

    #[test]
    fn test_unbalanced_payload_does_not_swallow_next_marker() {
        let text = format!(
            "2024.05.01 19:00:00 Log - Received Notification: {{\"id\": \"x\", \"details\": {{\n{}\n",
            JSON_LINE
        );
        let records = test_extractor().extract(&text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "not_1");
    }

    #[test]
    fn test_multiline_json_payload() {
        let text = "2024.05.01 20:00:00 Log - Received Notification: {\n  \"id\": \"not_2\",\n  \"details\": {\"groupId\": \"g\", \"message\": \"a } brace\"}\n}\n";
        let records = test_extractor().extract(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "a } brace");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let text = r#"Received Notification: {"details":{"groupId":"g9"}}"#;
        let records = test_extractor().extract(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "");
        assert_eq!(records[0].message, "");
        assert_eq!(records[0].created_at, "");
        assert_eq!(records[0].date, "");
        assert_eq!(records[0].group_id, "g9");
    }

    #[test]
    fn test_legacy_payload_is_classified() {
        let text = r#"2024.05.01 20:00:00 Log        -  Received Notification: <Notification from username:Bot, sender user id:usr_1 to of type: group, id: not_abc-1, created at: 05/01/2024 11:00:00 UTC, details: {}, type:group, m seen:False, message: "震度3の地震がありました\n続報あり">"#;
        let extractor = test_extractor();
        let records = extractor.extract(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "not_abc-1");
        assert_eq!(records[0].created_at, "05/01/2024 11:00:00 UTC");
        assert_eq!(records[0].group_id, "group_earthquake");
        assert_eq!(records[0].message, "震度3の地震がありました\n続報あり");
        assert_eq!(
            extractor.default_group_name("group_earthquake"),
            Some("🔔 地震情報")
        );
    }

    #[test]
    fn test_unknown_messages_hash_into_stable_groups() {
        let extractor = test_extractor();
        let a = extractor.classify_group("Weekly meetup tonight at the plaza");
        let b = extractor.classify_group("Weekly meetup tonight, bring friends");
        assert!(a.starts_with("group_other_"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_village_rule_needs_both_keyword_sets() {
        let extractor = test_extractor();
        assert_eq!(extractor.classify_group("村が開きました"), "group_village");
        assert_ne!(extractor.classify_group("村の話"), "group_village");
    }

    #[test]
    fn test_incremental_feed_does_not_reemit() {
        let mut inc = IncrementalExtractor::new(test_extractor());
        let first = inc.feed(&format!("{}\n", JSON_LINE));
        assert_eq!(first.len(), 1);
        let second = inc.feed("2024.05.01 20:00:01 Log - unrelated line\n");
        assert!(second.is_empty());
        assert_eq!(inc.pending_len(), 0);
    }

    #[test]
    fn test_incremental_feed_completes_split_payload() {
        let (head, tail) = JSON_LINE.split_at(JSON_LINE.len() - 20);
        let mut inc = IncrementalExtractor::new(test_extractor());
        assert!(inc.feed(head).is_empty());
        assert!(inc.pending_len() > 0);
        let records = inc.feed(&format!("{}\n", tail));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2024.05.01 20:00:00");
        assert!(inc.feed("next line\n").is_empty());
    }

    #[test]
    fn test_incremental_split_marker() {
        let (head, tail) = JSON_LINE.split_at(45);
        let mut inc = IncrementalExtractor::new(test_extractor());
        assert!(inc.feed(head).is_empty());
        assert_eq!(inc.feed(tail).len(), 1);
    }

    #[test]
    fn test_incremental_split_inside_legacy_prefix() {
        let line = r#"2024.05.01 20:00:00 Log        -  Received Notification: <Notification from username:Bot, id: not_l1, created at: 05/01/2024 11:00:00 UTC, message: "村が開きました">"#;
        let at = line.find(LEGACY_PREFIX).unwrap() + 5;
        let (head, tail) = line.split_at(at);
        assert!(head.ends_with("<Noti"));

        let mut inc = IncrementalExtractor::new(test_extractor());
        assert!(inc.feed(head).is_empty());
        assert!(inc.pending_len() > 0);
        let records = inc.feed(&format!("{}\n", tail));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "not_l1");
        assert_eq!(records[0].group_id, "group_village");
    }

    #[test]
    fn test_non_payload_after_marker_is_not_carried() {
        let mut inc = IncrementalExtractor::new(test_extractor());
        assert!(inc.feed("Received Notification: garbage").is_empty());
        assert!(inc.feed(" more\n").is_empty());
        assert_eq!(inc.pending_len(), 0);
    }

    #[test]
    fn test_two_payloads_on_one_line_split_between_reads() {
        let line = r#"Received Notification: {"id":"a"} Received Notification: {"id":"b"}"#;
        let (head, tail) = line.split_at(line.len() - 4);
        let mut inc = IncrementalExtractor::new(test_extractor());
        let first = inc.feed(head);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "a");
        let second = inc.feed(tail);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "b");
    }

    #[test]
    fn test_progress_callback_fires_per_batch() {
        let text = r#"Received Notification: {"id":"x"}"#.repeat(PROGRESS_BATCH * 2);
        let mut calls = 0;
        let records = test_extractor().extract_with_progress(&text, |_| calls += 1);
        assert_eq!(records.len(), PROGRESS_BATCH * 2);
        assert_eq!(calls, 2);
    }
}
