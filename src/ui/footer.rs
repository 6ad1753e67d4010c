use super::logview::level_color;
use crate::app::App;
use crate::loader::LoadStage;
use crate::record::LogLevel;
use crate::ui::MAX_PATH_LENGTH;
use crate::ui::colors::{
    FOOTER_BG, LEVEL_OFF_FG, RENAME_MODE_BG, RENAME_MODE_FG, SEARCH_MODE_BG, SEARCH_MODE_FG, STATUS_WARNING_FG,
};
use num_format::{Locale, ToFormattedString};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

impl App {
    /// Formats the selected row against the number of rows, with the record
    /// count when filtering hides some.
    pub(super) fn format_progression_text(&self) -> String {
        let total_rows = self.total_rows();
        let total_records = self.engine.records().len();
        let current_line = if total_rows == 0 { 0 } else { self.viewport.selected_line + 1 };
        let percent = if total_rows > 0 {
            (current_line * 100) / total_rows
        } else {
            0
        };

        let shown = self.renderer.list().member_rows();
        if shown == total_records {
            format!(
                "{}/{} {:3}%",
                current_line.to_formatted_string(&Locale::en),
                total_rows.to_formatted_string(&Locale::en),
                percent
            )
        } else {
            format!(
                "{}/{} ({}) {:3}%",
                current_line.to_formatted_string(&Locale::en),
                total_rows.to_formatted_string(&Locale::en),
                total_records.to_formatted_string(&Locale::en),
                percent
            )
        }
    }

    /// Loading progress, the last problem or the time of the last update.
    fn status_span(&self) -> Span<'static> {
        let status = self.engine.status();
        if status.loading || status.filtering {
            let text = match status.stage {
                None if !status.loading => "filtering".to_string(),
                None | Some(LoadStage::Reading) => "loading".to_string(),
                Some(LoadStage::Parsing { lines, total }) => format!(
                    "parsing {}/{}",
                    lines.to_formatted_string(&Locale::en),
                    total.to_formatted_string(&Locale::en)
                ),
                Some(LoadStage::Extracting { markers }) => {
                    format!("extracting {} notifications", markers.to_formatted_string(&Locale::en))
                }
                Some(LoadStage::Filtering { records, total }) => format!(
                    "filtering {}/{}",
                    records.to_formatted_string(&Locale::en),
                    total.to_formatted_string(&Locale::en)
                ),
            };
            return Span::raw(text);
        }
        if let Some(warning) = &status.warning {
            return Span::styled(warning.clone(), Style::default().fg(STATUS_WARNING_FG));
        }
        match status.last_update {
            Some(time) => Span::raw(format!(
                "{} bytes @ {}",
                status.bytes_read.to_formatted_string(&Locale::en),
                time.format("%H:%M:%S")
            )),
            None => Span::raw(""),
        }
    }

    fn file_name(&self, width: u16) -> String {
        let max_width = MAX_PATH_LENGTH.min((width as usize / 2).saturating_sub(13));
        let path = self.engine.path().display().to_string();
        if path.chars().count() > max_width {
            let skip = path.chars().count().saturating_sub(max_width);
            let suffix: String = path.chars().skip(skip).collect();
            format!("...{}", suffix)
        } else {
            path
        }
    }

    pub(super) fn render_default_footer(&self, area: Rect, buf: &mut Buffer) {
        let filter = self.engine.filter();
        let levels = filter.levels();

        let mut left = vec![Span::raw(self.file_name(area.width)), Span::raw(" |")];
        for (n, level) in LogLevel::ALL.into_iter().enumerate() {
            let style = if levels.contains(level) {
                Style::default().fg(level_color(level))
            } else {
                Style::default().fg(LEVEL_OFF_FG).add_modifier(Modifier::CROSSED_OUT)
            };
            left.push(Span::styled(format!(" {}:{}", n + 1, level), style));
        }
        if filter.collapse_repeats() {
            left.push(Span::raw(format!(" | collapse {}", filter.collapse_threshold())));
        }
        if let Some(search) = filter.search_text() {
            left.push(Span::raw(format!(" | /{}", search)));
        }
        if self.auto_update {
            left.push(Span::raw(" | auto"));
        }
        if self.viewport.follow {
            left.push(Span::raw(" | follow"));
        }

        let middle = Line::from("h:Help").centered();
        let right = Line::from(vec![
            self.status_span(),
            Span::raw(format!(" | {} ", self.format_progression_text())),
        ])
        .right_aligned();

        let footer = Block::default()
            .title_bottom(Line::from(left))
            .title_bottom(middle)
            .title_bottom(right)
            .style(Style::default().bg(FOOTER_BG));
        footer.render(area, buf);
    }

    pub(super) fn render_search_footer(&self, area: Rect, buf: &mut Buffer) {
        let search_prompt = Line::from(format!("/{}", self.input_query)).left_aligned();
        let progression = Line::from(self.format_progression_text() + " ").right_aligned();

        let search_bar = Block::default()
            .title_bottom(search_prompt)
            .title_bottom(progression)
            .style(
                Style::default()
                    .fg(SEARCH_MODE_FG)
                    .bg(SEARCH_MODE_BG)
                    .add_modifier(Modifier::BOLD),
            );

        search_bar.render(area, buf);
    }

    pub(super) fn render_rename_footer(&self, area: Rect, buf: &mut Buffer) {
        let prompt = Line::from(format!("Group name: {}", self.input_query)).left_aligned();
        let hint = Line::from("empty restores the default ").right_aligned();

        let bar = Block::default().title_bottom(prompt).title_bottom(hint).style(
            Style::default()
                .fg(RENAME_MODE_FG)
                .bg(RENAME_MODE_BG)
                .add_modifier(Modifier::BOLD),
        );

        bar.render(area, buf);
    }
}
