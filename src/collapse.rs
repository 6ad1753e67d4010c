use crate::record::{LogLevel, LogRecord};
use crate::utils::truncate_chars;
use regex::Regex;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

/// `[Behaviour] ...` style prefix naming the subsystem of a line.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\[([\w\s]+)\]").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Characters of content compared when a line carries no tag.
const SHAPE_PREFIX_CHARS: usize = 100;

/// Header label for runs of untagged lines.
pub const SAME_MESSAGE_LABEL: &str = "同じメッセージ";

/// Key deciding whether two consecutive records belong to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Tag(String),
    /// Content prefix with digit runs replaced by `N`.
    Shape(String),
}

impl Signature {
    pub fn of(content: &str) -> Self {
        if let Some(caps) = TAG_RE.captures(content)
            && let Some(tag) = caps.get(1)
        {
            return Signature::Tag(tag.as_str().trim().to_string());
        }
        let prefix = truncate_chars(content, SHAPE_PREFIX_CHARS);
        Signature::Shape(DIGITS_RE.replace_all(prefix, "N").into_owned())
    }

    fn label(&self) -> &str {
        match self {
            Signature::Tag(tag) => tag,
            Signature::Shape(_) => SAME_MESSAGE_LABEL,
        }
    }
}

/// A header row and the members folded under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapsedSpan {
    pub header: usize,
    /// One past the last member.
    pub end: usize,
}

impl CollapsedSpan {
    pub fn members(&self) -> Range<usize> {
        self.header + 1..self.end
    }

    pub fn member_count(&self) -> usize {
        self.end - self.header - 1
    }
}

/// Ordered rows produced by the filter pipeline.
///
/// Rebuilt wholesale on every filter change and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    records: Vec<Arc<LogRecord>>,
    spans: Vec<CollapsedSpan>,
}

impl DisplayList {
    pub fn new(records: Vec<Arc<LogRecord>>, spans: Vec<CollapsedSpan>) -> Self {
        Self { records, spans }
    }

    /// A list without any collapsed spans.
    pub fn plain(records: Vec<Arc<LogRecord>>) -> Self {
        Self {
            records,
            spans: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<LogRecord>> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Arc<LogRecord>] {
        &self.records
    }

    /// Spans recorded while collapsing, ordered by header index.
    pub fn spans(&self) -> &[CollapsedSpan] {
        &self.spans
    }

    /// Count of records that are not synthetic headers.
    pub fn member_rows(&self) -> usize {
        self.records.len() - self.spans.len()
    }
}

/// Folds runs of at least `threshold` records sharing a signature under a
/// synthetic header. Shorter runs pass through unchanged.
pub fn collapse(records: Vec<Arc<LogRecord>>, threshold: usize) -> DisplayList {
    let threshold = threshold.max(1);
    let mut out = Vec::with_capacity(records.len());
    let mut spans = Vec::new();

    let mut run: Vec<Arc<LogRecord>> = Vec::new();
    let mut run_sig: Option<Signature> = None;

    for record in records {
        let sig = Signature::of(&record.content);
        if run_sig.as_ref() != Some(&sig) {
            if let Some(prev) = run_sig.take() {
                flush_run(&mut out, &mut spans, &mut run, &prev, threshold);
            }
            run_sig = Some(sig);
        }
        run.push(record);
    }
    if let Some(prev) = run_sig {
        flush_run(&mut out, &mut spans, &mut run, &prev, threshold);
    }

    DisplayList::new(out, spans)
}

fn flush_run(
    out: &mut Vec<Arc<LogRecord>>,
    spans: &mut Vec<CollapsedSpan>,
    run: &mut Vec<Arc<LogRecord>>,
    sig: &Signature,
    threshold: usize,
) {
    if run.len() >= threshold {
        let level = run
            .iter()
            .map(|r| r.level)
            .min_by_key(|l| l.severity())
            .unwrap_or(LogLevel::Unknown);
        let header = out.len();
        out.push(Arc::new(LogRecord::header(sig.label(), level, run.len())));
        spans.push(CollapsedSpan {
            header,
            end: header + 1 + run.len(),
        });
    }
    out.append(run);
}
