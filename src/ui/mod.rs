pub mod colors;
mod footer;
mod logview;
mod popups;

use crate::app::{App, AppState};
use colors::{GRAY_COLOR, WHITE_COLOR};
use popups::popup_area;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::Line,
    widgets::{Block, Widget},
};

/// Maximum length for file path display in footer.
const MAX_PATH_LENGTH: usize = 90;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let [top, middle, bottom] =
            Layout::vertical([Constraint::Length(1), Constraint::Fill(1), Constraint::Length(1)]).areas(area);

        let [log_view_area, scrollbar_area] =
            Layout::horizontal([Constraint::Fill(1), Constraint::Length(1)]).areas(middle);

        // Title
        let title_middle = Line::from(" Lognote ").centered();
        let title_right = Line::from(format!("v{}", env!("CARGO_PKG_VERSION")))
            .right_aligned()
            .style(Style::default().fg(WHITE_COLOR));
        let title = Block::default()
            .title_bottom(title_middle)
            .title_bottom(title_right)
            .style(Style::default().bg(GRAY_COLOR));
        title.render(top, buf);

        // Main view
        self.render_log_view(log_view_area, buf);
        self.render_scrollbar(scrollbar_area, buf);

        // Footer
        match &self.app_state {
            AppState::SearchMode => self.render_search_footer(bottom, buf),
            AppState::RenameMode(_) => self.render_rename_footer(bottom, buf),
            _ => self.render_default_footer(bottom, buf),
        }

        // Popups
        match &self.app_state {
            AppState::GroupsView | AppState::RenameMode(_) => {
                let height = (self.engine.groups().len() as u16).saturating_add(3);
                self.render_groups_list(popup_area(area, 70, height), buf);
            }
            AppState::MessagesView(selection) => {
                self.render_messages(selection, popup_area(area, 100, area.height), buf)
            }
            AppState::StatisticsView => self.render_statistics(area, buf),
            AppState::ConfirmLargeFile(size) => self.render_large_file_popup(*size, area, buf),
            AppState::ErrorState(error_msg) => self.render_error_popup(error_msg, area, buf),
            AppState::LogView | AppState::SearchMode => {}
        }

        // Help popup
        if self.show_help {
            let help_area = popup_area(area, 50, 26);
            popups::render_help_popup(help_area, buf);
        }
    }
}
