use super::colors::{
    DEBUG_FG, ERROR_FG, EXPANDED_MARKER, FOLDED_MARKER, INFO_FG, NOTIFICATION_FG, RIGHT_ARROW, SCROLLBAR_FG,
    TIMESTAMP_FG, UNKNOWN_FG, WARNING_FG,
};
use crate::app::App;
use crate::record::{LogLevel, TAG_NOTIFICATION};
use crate::viewport::VisibleRow;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListState, Scrollbar, ScrollbarOrientation, ScrollbarState, StatefulWidget},
};

pub(super) fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Error => ERROR_FG,
        LogLevel::Warning => WARNING_FG,
        LogLevel::Info => INFO_FG,
        LogLevel::Debug => DEBUG_FG,
        LogLevel::Unknown => UNKNOWN_FG,
    }
}

impl App {
    /// Renders the vertical scrollbar.
    pub(super) fn render_scrollbar(&self, area: Rect, buf: &mut Buffer) {
        let mut scrollbar_state = ScrollbarState::new(self.total_rows())
            .position(self.viewport.selected_line)
            .viewport_content_length(1);

        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .track_style(Style::default().fg(SCROLLBAR_FG))
            .begin_symbol(None)
            .end_symbol(None);

        StatefulWidget::render(scrollbar, area, buf, &mut scrollbar_state);
    }

    /// Renders the rows of the folded display list inside the viewport.
    pub(super) fn render_log_view(&self, area: Rect, buf: &mut Buffer) {
        let window = self.viewport.window();
        let rows = self.renderer.visible_rows(window);
        let items: Vec<Line> = rows.iter().map(row_line).collect();

        let mut list_state = ListState::default();
        let selected = self.viewport.selected_line;
        if selected >= window.offset && selected < window.offset + rows.len() {
            list_state.select(Some(selected - window.offset));
        }

        let log_list = List::new(items)
            .highlight_symbol(RIGHT_ARROW)
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));

        StatefulWidget::render(log_list, area, buf, &mut list_state);
    }
}

fn row_line(row: &VisibleRow) -> Line<'_> {
    let record = &row.record;
    let level_style = Style::default().fg(level_color(record.level));

    if record.is_group_header() {
        let marker = if row.folded { FOLDED_MARKER } else { EXPANDED_MARKER };
        return Line::from(vec![
            Span::raw(marker),
            Span::styled(record.content.as_str(), level_style.add_modifier(Modifier::BOLD)),
        ]);
    }

    let mut spans = Vec::with_capacity(5);
    if row.nested {
        spans.push(Span::raw("    "));
    }
    if !record.timestamp.is_empty() {
        spans.push(Span::styled(record.timestamp.as_str(), Style::default().fg(TIMESTAMP_FG)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(format!("[{}] ", record.level), level_style));

    let content_style = if record.has_tag(TAG_NOTIFICATION) {
        Style::default().fg(NOTIFICATION_FG)
    } else {
        Style::default()
    };
    spans.push(Span::styled(record.content.as_str(), content_style));
    Line::from(spans)
}
