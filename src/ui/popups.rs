use super::colors::{
    GROUP_BORDER, GROUP_COUNT_FG, GROUP_RENAMED_FG, HELP_BG, HELP_BORDER_FG, HELP_HEADER_FG, MESSAGE_BORDER,
    MESSAGE_DATE_FG, MESSAGE_ERROR_FG, MESSAGE_INFO_FG, RIGHT_ARROW, WHITE_COLOR,
};
use crate::app::App;
use crate::group::Selection;
use crate::record::LogLevel;
use num_format::{Locale, ToFormattedString};
use ratatui::widgets::{BorderType, Padding};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListState, Paragraph, StatefulWidget, Widget, Wrap},
};

/// Calculates a centered popup area within the given rect.
///
/// The popup will be centered with at least 2 characters margin on all sides.
pub(super) fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let min_margin = 2;

    let max_width = area.width.saturating_sub(2 * min_margin);
    let max_height = area.height.saturating_sub(2 * min_margin);

    let popup_width = width.min(max_width);
    let popup_height = height.min(max_height);

    let x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let y = area.y + (area.height.saturating_sub(popup_height)) / 2;

    Rect {
        x,
        y,
        width: popup_width,
        height: popup_height,
    }
}

pub(super) fn render_help_popup(popup_area: Rect, buf: &mut Buffer) {
    Clear.render(popup_area, buf);

    let header = Style::default().fg(HELP_HEADER_FG).add_modifier(Modifier::BOLD);
    let help_text = vec![
        Line::from("Log view").style(header),
        Line::from("q            Quit"),
        Line::from("Down/Up      Navigate"),
        Line::from("g/G          Go to start/end"),
        Line::from("PageUp/Down  Page up/down"),
        Line::from("1-5          Toggle Error/Warning/Info/Debug/-"),
        Line::from("/            Search (Esc clears)"),
        Line::from("c            Toggle collapsing of repeats"),
        Line::from("Enter/Space  Open or fold a collapsed run"),
        Line::from("e/E          Open/fold all runs"),
        Line::from("a            Toggle auto-update"),
        Line::from("t            Toggle follow"),
        Line::from("r/F5         Reload the file"),
        Line::from("s            Statistics"),
        Line::from("n            Notification groups"),
        Line::from("Notification groups").style(header),
        Line::from("Enter        Show messages"),
        Line::from("r            Rename group"),
        Line::from("Esc          Back"),
    ];

    let block = Block::default()
        .title(" Help ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(HELP_BORDER_FG))
        .style(Style::default().bg(HELP_BG));

    let help_popup = Paragraph::new(help_text)
        .block(block)
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });

    help_popup.render(popup_area, buf);
}

impl App {
    /// Renders a centered popup that adapts to content size.
    pub(super) fn render_popup(&self, message: &str, title: &str, title_color: Color, area: Rect, buf: &mut Buffer) {
        let lines: Vec<&str> = message.split('\n').collect();
        let max_line_width = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);

        let popup_width = (max_line_width as u16 + 6).min(area.width.saturating_sub(4));
        let popup_height = (lines.len() as u16 + 4).min(area.height.saturating_sub(4));
        let popup_area = popup_area(area, popup_width, popup_height);

        Clear.render(popup_area, buf);

        let border_color = if title == "Error" {
            MESSAGE_ERROR_FG
        } else {
            MESSAGE_BORDER
        };

        let block = Block::default()
            .title(format!(" {} ", title))
            .title_style(Style::default().fg(title_color))
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border_color))
            .padding(Padding::uniform(1));

        let popup = Paragraph::new(message)
            .block(block)
            .alignment(Alignment::Center);

        popup.render(popup_area, buf);
    }

    /// Renders a centered error popup that adapts to content size.
    pub(super) fn render_error_popup(&self, error_msg: &str, area: Rect, buf: &mut Buffer) {
        self.render_popup(error_msg, "Error", MESSAGE_ERROR_FG, area, buf);
    }

    pub(super) fn render_large_file_popup(&self, size: u64, area: Rect, buf: &mut Buffer) {
        let message = format!(
            "{} is {} MB.\nLoading it may take a while.\n\nLoad anyway? (y/n)",
            self.engine.path().display(),
            (size / (1024 * 1024)).to_formatted_string(&Locale::en)
        );
        self.render_popup(&message, "Large file", MESSAGE_INFO_FG, area, buf);
    }

    pub(super) fn render_statistics(&self, area: Rect, buf: &mut Buffer) {
        let stats = self.engine.statistics();
        let mut lines = vec![format!("Lines           {:>10}", stats.total.to_formatted_string(&Locale::en))];
        for level in LogLevel::ALL {
            lines.push(format!(
                "{:<15} {:>10} {:5.1}%",
                level.label(),
                stats.count(level).to_formatted_string(&Locale::en),
                stats.percent(level)
            ));
        }
        lines.push(format!("Truncated       {:>10}", stats.truncated.to_formatted_string(&Locale::en)));
        lines.push(format!("Notifications   {:>10}", stats.notifications.to_formatted_string(&Locale::en)));
        lines.push(format!("Groups          {:>10}", stats.groups.to_formatted_string(&Locale::en)));
        self.render_popup(&lines.join("\n"), "Statistics", MESSAGE_INFO_FG, area, buf);
    }

    /// Renders the notification groups, largest first, below an "all" row.
    pub(super) fn render_groups_list(&self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);

        let groups = self.group_rows();
        let mut items = vec![Line::from(vec![
            Span::raw("All messages "),
            Span::styled(
                format!("({})", self.engine.groups().total_messages().to_formatted_string(&Locale::en)),
                Style::default().fg(GROUP_COUNT_FG),
            ),
        ])];
        items.extend(groups.iter().map(|group| {
            let name_style = if group.is_renamed() {
                Style::default().fg(GROUP_RENAMED_FG)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(group.display_name.as_str(), name_style),
                Span::raw(" "),
                Span::styled(
                    format!("({})", group.message_count().to_formatted_string(&Locale::en)),
                    Style::default().fg(GROUP_COUNT_FG),
                ),
            ])
        }));

        let mut list_state = ListState::default();
        list_state.select(Some(self.group_selected.min(groups.len())));

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Notification groups ")
                    .title_alignment(Alignment::Center)
                    .title_style(Style::default().bold())
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(GROUP_BORDER)),
            )
            .highlight_symbol(RIGHT_ARROW)
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));

        StatefulWidget::render(list, area, buf, &mut list_state);
    }

    /// Renders the messages of a selection in file order from `message_offset`.
    pub(super) fn render_messages(&self, selection: &Selection, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);

        let groups = self.engine.groups();
        let title = match selection {
            Selection::All => " All messages ".to_string(),
            Selection::Group(group_id) => groups
                .get(group_id)
                .map_or_else(|| format!(" {} ", group_id), |g| format!(" {} ", g.display_name)),
        };

        let messages = groups.messages_for(selection);
        let visible = area.height.saturating_sub(2) as usize;
        let items: Vec<Line> = messages
            .iter()
            .skip(self.message_offset)
            .take(visible)
            .map(|message| {
                Line::from(vec![
                    Span::styled(message.date.as_str(), Style::default().fg(MESSAGE_DATE_FG)),
                    Span::raw(" "),
                    Span::styled(message.message.as_str(), Style::default().fg(WHITE_COLOR)),
                ])
            })
            .collect();

        let list = List::new(items).block(
            Block::default()
                .title(title)
                .title_bottom(
                    Line::from(format!(
                        " {}/{} ",
                        (self.message_offset + 1).min(messages.len()),
                        messages.len().to_formatted_string(&Locale::en)
                    ))
                    .right_aligned(),
                )
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(GROUP_BORDER)),
        );

        Widget::render(list, area, buf);
    }
}
