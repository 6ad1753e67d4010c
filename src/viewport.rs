use crate::collapse::{CollapsedSpan, DisplayList};
use crate::record::LogRecord;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Scroll state of the log list: selection, top row and page height.
#[derive(Debug, Default)]
pub struct Viewport {
    pub top_line: usize,
    pub height: usize,
    pub selected_line: usize,
    pub scroll_margin: usize,
    /// Keep the selection on the last row as rows are appended.
    pub follow: bool,
}

impl Viewport {
    pub fn resize(&mut self, height: usize) {
        if self.height != height {
            self.height = height;
            info!("Viewport resized: height={}", height);
        }
    }

    pub fn move_up(&mut self, total_lines: usize) {
        if self.selected_line > 0 {
            self.selected_line -= 1;
            self.follow = false;
            self.adjust_visible(total_lines);
        }
    }

    pub fn move_down(&mut self, total_lines: usize) {
        if self.selected_line + 1 < total_lines {
            self.selected_line += 1;
            self.adjust_visible(total_lines);
            debug!(
                "move_down: selected={}, top={}, height={}",
                self.selected_line, self.top_line, self.height
            );
        }
    }

    pub fn page_up(&mut self, total_lines: usize) {
        self.selected_line = self.selected_line.saturating_sub(self.height.max(1));
        self.follow = false;
        self.adjust_visible(total_lines);
    }

    pub fn page_down(&mut self, total_lines: usize) {
        self.selected_line =
            (self.selected_line + self.height.max(1)).min(total_lines.saturating_sub(1));
        self.adjust_visible(total_lines);
    }

    pub fn goto_top(&mut self, total_lines: usize) {
        self.selected_line = 0;
        self.follow = false;
        self.adjust_visible(total_lines);
    }

    pub fn goto_bottom(&mut self, total_lines: usize) {
        self.selected_line = total_lines.saturating_sub(1);
        self.adjust_visible(total_lines);
    }

    /// Re-clamps after the list changed size.
    pub fn list_changed(&mut self, total_lines: usize) {
        if self.follow {
            self.selected_line = total_lines.saturating_sub(1);
        } else {
            self.selected_line = self.selected_line.min(total_lines.saturating_sub(1));
        }
        self.adjust_visible(total_lines);
    }

    pub fn window(&self) -> ViewportWindow {
        ViewportWindow {
            offset: self.top_line,
            length: self.height,
        }
    }

    fn adjust_visible(&mut self, total_lines: usize) {
        if total_lines == 0 {
            self.top_line = 0;
            self.selected_line = 0;
            return;
        }

        // Scroll up if selection gets too close to top
        if self.selected_line < self.top_line + self.scroll_margin {
            self.top_line = self.selected_line.saturating_sub(self.scroll_margin);
        }

        // Scroll down if selection gets too close to bottom
        let bottom_margin_line =
            (self.top_line + self.height).saturating_sub(self.scroll_margin + 1);
        if self.selected_line > bottom_margin_line {
            self.top_line = (self.selected_line + self.scroll_margin + 1)
                .saturating_sub(self.height)
                .min(total_lines.saturating_sub(self.height));
        }

        if total_lines <= self.height {
            self.top_line = 0;
        }
    }
}

/// A contiguous range of rows requested by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportWindow {
    pub offset: usize,
    pub length: usize,
}

/// `list[offset .. offset + length]`, clamped to the list. O(window).
pub fn visible_slice(list: &DisplayList, window: ViewportWindow) -> &[Arc<LogRecord>] {
    let records = list.records();
    let start = window.offset.min(records.len());
    let end = window.offset.saturating_add(window.length).min(records.len());
    &records[start..end]
}

/// One materialized row of the folded view.
#[derive(Debug, Clone)]
pub struct VisibleRow {
    /// Index into the display list.
    pub index: usize,
    pub record: Arc<LogRecord>,
    /// Member of an expanded span.
    pub nested: bool,
    /// Header of a span that is currently folded.
    pub folded: bool,
}

/// Receives every freshly built display list.
pub trait DisplaySink {
    fn accept(&mut self, list: Arc<DisplayList>) -> io::Result<()>;

    /// Whether the sink only materializes a window of the list.
    fn supports_windowing(&self) -> bool {
        false
    }
}

/// Folded span with the number of rows hidden before it.
#[derive(Debug, Clone, Copy)]
struct Fold {
    header: usize,
    hidden: usize,
    hidden_before: usize,
}

/// Maps the folded view of a display list onto its rows.
///
/// Spans start collapsed. Only the rows of a requested window are ever
/// materialized.
#[derive(Debug, Default)]
pub struct ViewportRenderer {
    list: Arc<DisplayList>,
    /// Marked spans ordered by header.
    spans: Vec<CollapsedSpan>,
    /// Headers of spans the user opened.
    expanded: Arc<HashSet<usize>>,
    folds: Vec<Fold>,
}

impl ViewportRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &Arc<DisplayList> {
        &self.list
    }

    /// Installs a new list, replacing the span bookkeeping of the old one.
    /// A span stays open when it still starts at the same record.
    pub fn set_list(&mut self, list: Arc<DisplayList>) {
        let open_members: HashSet<*const LogRecord> = self
            .expanded
            .iter()
            .filter_map(|&header| self.list.get(header + 1))
            .map(Arc::as_ptr)
            .collect();

        // Collapser spans are already ordered and disjoint.
        self.spans = list.spans().to_vec();
        self.expanded = Arc::new(
            self.spans
                .iter()
                .filter(|span| {
                    list.get(span.header + 1)
                        .is_some_and(|first| open_members.contains(&Arc::as_ptr(first)))
                })
                .map(|span| span.header)
                .collect(),
        );
        self.list = list;
        self.rebuild_folds();
    }

    pub fn visible_slice(&self, window: ViewportWindow) -> &[Arc<LogRecord>] {
        visible_slice(&self.list, window)
    }

    /// Records a span with its header at `start` and members `start + 1 .. end`,
    /// folded. Returns false for empty, out-of-range or overlapping spans.
    pub fn mark_range_as_group(&mut self, start: usize, end: usize) -> bool {
        if end <= start.saturating_add(1) || end > self.list.len() {
            return false;
        }
        let pos = self.spans.partition_point(|s| s.header < start);
        let overlaps_prev = pos > 0 && self.spans[pos - 1].end > start;
        let overlaps_next = self.spans.get(pos).is_some_and(|s| s.header < end);
        if overlaps_prev || overlaps_next {
            return false;
        }
        self.spans.insert(pos, CollapsedSpan { header: start, end });
        self.rebuild_folds();
        true
    }

    /// Opens or folds the span headed at `header`. Returns false when no span
    /// starts there.
    pub fn toggle_group(&mut self, header: usize) -> bool {
        if self.span_at_header(header).is_none() {
            return false;
        }
        let expanded = Arc::make_mut(&mut self.expanded);
        if !expanded.remove(&header) {
            expanded.insert(header);
        }
        self.rebuild_folds();
        true
    }

    pub fn is_expanded(&self, header: usize) -> bool {
        self.expanded.contains(&header)
    }

    pub fn expand_all(&mut self) {
        self.expanded = Arc::new(self.spans.iter().map(|s| s.header).collect());
        self.rebuild_folds();
    }

    pub fn collapse_all(&mut self) {
        self.expanded = Arc::new(HashSet::new());
        self.rebuild_folds();
    }

    /// Number of rows in the folded view.
    pub fn folded_len(&self) -> usize {
        let hidden = self.folds.last().map_or(0, |f| f.hidden_before + f.hidden);
        self.list.len() - hidden
    }

    /// Display-list index shown at folded row `row`.
    pub fn row_index(&self, row: usize) -> Option<usize> {
        if row >= self.folded_len() {
            return None;
        }
        let k = self
            .folds
            .partition_point(|f| f.header - f.hidden_before <= row);
        if k == 0 {
            return Some(row);
        }
        let fold = self.folds[k - 1];
        if row == fold.header - fold.hidden_before {
            Some(fold.header)
        } else {
            Some(row + fold.hidden_before + fold.hidden)
        }
    }

    /// Folded row showing display-list index `index`; for hidden members the
    /// row of their header.
    pub fn row_of(&self, index: usize) -> usize {
        let k = self.folds.partition_point(|f| f.header < index);
        if k == 0 {
            return index;
        }
        let fold = self.folds[k - 1];
        if index <= fold.header + fold.hidden {
            fold.header - fold.hidden_before
        } else {
            index - fold.hidden_before - fold.hidden
        }
    }

    /// Rows of the folded view inside `window`.
    pub fn visible_rows(&self, window: ViewportWindow) -> Vec<VisibleRow> {
        let end = window
            .offset
            .saturating_add(window.length)
            .min(self.folded_len());
        (window.offset.min(end)..end)
            .filter_map(|row| self.row_index(row))
            .filter_map(|index| {
                let record = Arc::clone(self.list.get(index)?);
                let header_span = self.span_at_header(index);
                Some(VisibleRow {
                    index,
                    nested: header_span.is_none() && self.enclosing_span(index).is_some(),
                    folded: header_span.is_some() && !self.is_expanded(index),
                    record,
                })
            })
            .collect()
    }

    fn span_at_header(&self, header: usize) -> Option<&CollapsedSpan> {
        self.spans
            .binary_search_by_key(&header, |s| s.header)
            .ok()
            .map(|pos| &self.spans[pos])
    }

    fn enclosing_span(&self, index: usize) -> Option<&CollapsedSpan> {
        let pos = self.spans.partition_point(|s| s.header < index);
        let span = self.spans.get(pos.checked_sub(1)?)?;
        span.members().contains(&index).then_some(span)
    }

    fn rebuild_folds(&mut self) {
        self.folds.clear();
        let mut hidden_before = 0;
        for span in &self.spans {
            if self.expanded.contains(&span.header) {
                continue;
            }
            let hidden = span.member_count();
            self.folds.push(Fold {
                header: span.header,
                hidden,
                hidden_before,
            });
            hidden_before += hidden;
        }
    }
}

impl DisplaySink for ViewportRenderer {
    fn accept(&mut self, list: Arc<DisplayList>) -> io::Result<()> {
        self.set_list(list);
        Ok(())
    }

    fn supports_windowing(&self) -> bool {
        true
    }
}

/// Writes every row of each accepted list as plain text.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for TextSink<W> {
    fn accept(&mut self, list: Arc<DisplayList>) -> io::Result<()> {
        let mut spans = list.spans().iter().peekable();
        let mut open_until = 0;
        for (index, record) in list.records().iter().enumerate() {
            if let Some(span) = spans.next_if(|s| s.header == index) {
                open_until = span.end;
                writeln!(self.out, "{}", record.content)?;
                continue;
            }
            let indent = if index < open_until { "  " } else { "" };
            if record.timestamp.is_empty() {
                writeln!(self.out, "{}[{}] {}", indent, record.level, record.content)?;
            } else {
                writeln!(
                    self.out,
                    "{}{} [{}] {}",
                    indent, record.timestamp, record.level, record.content
                )?;
            }
        }
        self.out.flush()
    }
}
