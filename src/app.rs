use crate::{
    config::Config,
    engine::{Command, Engine},
    event::{AppEvent, Event, EventHandler},
    filter::FilterConfig,
    group::{GroupRecord, Selection},
    loader::LoadEvent,
    record::{LogLevel, LogRecord},
    tailer,
    viewport::{Viewport, ViewportRenderer},
};
use ratatui::{
    Terminal,
    backend::Backend,
    crossterm::event::{KeyCode, KeyEvent, KeyModifiers},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    LogView,
    SearchMode,
    /// Notification groups. Row 0 stands for every message.
    GroupsView,
    MessagesView(Selection),
    /// Editing the name of the group with this id.
    RenameMode(String),
    StatisticsView,
    /// The file has this many bytes and waits for confirmation.
    ConfirmLargeFile(u64),
    ErrorState(String),
}

/// Application.
pub struct App {
    pub running: bool,
    pub show_help: bool,
    pub app_state: AppState,
    pub events: EventHandler,
    pub engine: Engine,
    pub renderer: ViewportRenderer,
    pub viewport: Viewport,
    pub input_query: String,
    pub auto_update: bool,
    auto_update_interval: Duration,
    last_tail_check: Instant,
    /// Selected row of the groups popup.
    pub group_selected: usize,
    /// First row of the messages popup.
    pub message_offset: usize,
}

impl App {
    /// Constructs the app and starts loading `path`. Files above the
    /// configured size wait for confirmation first.
    pub fn new(path: PathBuf, config: &Config) -> color_eyre::Result<Self> {
        let events = EventHandler::new();
        let engine = Engine::new(path, config, events.load_sender())?;

        let mut app = Self {
            running: true,
            show_help: false,
            app_state: AppState::LogView,
            events,
            engine,
            renderer: ViewportRenderer::new(),
            viewport: Viewport::default(),
            input_query: String::new(),
            auto_update: config.tail.auto_update,
            auto_update_interval: config.auto_update_interval(),
            last_tail_check: Instant::now(),
            group_selected: 0,
            message_offset: 0,
        };
        app.viewport.follow = config.tail.auto_update;

        match tailer::file_size(app.engine.path()) {
            Ok(size) if size > config.large_file_warning_bytes() => {
                app.next_state(AppState::ConfirmLargeFile(size))
            }
            Ok(_) => {
                app.engine.reload();
            }
            Err(e) => app.next_state(AppState::ErrorState(e.to_string())),
        }

        Ok(app)
    }

    fn next_state(&mut self, state: AppState) {
        self.app_state = state;
    }

    /// Number of rows the log view can scroll through.
    pub fn total_rows(&self) -> usize {
        self.renderer.folded_len()
    }

    /// Groups in popup order, largest first.
    pub fn group_rows(&self) -> Vec<&GroupRecord> {
        self.engine.groups().list_sorted_by_message_count_desc()
    }

    fn group_selection(&self) -> Selection {
        match self.group_selected.checked_sub(1) {
            None => Selection::All,
            Some(row) => self
                .group_rows()
                .get(row)
                .map_or(Selection::All, |g| Selection::Group(g.group_id.clone())),
        }
    }

    fn selected_record(&self) -> Option<Arc<LogRecord>> {
        let index = self.renderer.row_index(self.viewport.selected_line)?;
        self.renderer.list().get(index).cloned()
    }

    /// Hands the engine's display list to the renderer and keeps the
    /// selection on the same record where it still exists.
    fn refresh_display(&mut self) -> color_eyre::Result<()> {
        let anchor = self.selected_record();
        let old_index = self.renderer.row_index(self.viewport.selected_line);

        self.engine.publish(&mut self.renderer)?;

        if !self.viewport.follow {
            let list = self.renderer.list();
            // Appends leave earlier rows in place.
            let still_there = |i: &usize| match (&anchor, list.get(*i)) {
                (Some(anchor), Some(record)) => Arc::ptr_eq(anchor, record),
                _ => false,
            };
            let index = old_index
                .filter(still_there)
                .or_else(|| {
                    let record = anchor.as_ref()?;
                    list.records().iter().position(|r| Arc::ptr_eq(r, record))
                })
                .or_else(|| old_index.map(|i| i.min(list.len().saturating_sub(1))));
            if let Some(index) = index {
                self.viewport.selected_line = self.renderer.row_of(index);
            }
        }
        self.viewport.list_changed(self.total_rows());
        Ok(())
    }

    fn apply_filter(
        &mut self,
        change: impl FnOnce(FilterConfig) -> FilterConfig,
    ) -> color_eyre::Result<()> {
        let config = change(self.engine.filter().clone());
        self.engine.dispatch(Command::ApplyFilter(config))?;
        Ok(())
    }

    fn handle_load_event(&mut self, event: LoadEvent) -> color_eyre::Result<()> {
        let initial_failure = match &event {
            LoadEvent::Failed {
                generation,
                initial: true,
                ..
            } => *generation == self.engine.generation(),
            _ => false,
        };

        if self.engine.handle_event(event) {
            self.refresh_display()?;
        }

        if initial_failure && let Some(error) = &self.engine.status().load_error {
            let message = format!(
                "Failed to load file: {}\nError: {}",
                self.engine.path().display(),
                error
            );
            self.next_state(AppState::ErrorState(message));
        }
        Ok(())
    }

    /// Run the application's main loop.
    pub async fn run<B: Backend>(mut self, mut terminal: Terminal<B>) -> color_eyre::Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        let terminal_size = terminal.size()?;
        self.viewport
            .resize(terminal_size.height.saturating_sub(2) as usize);
        self.viewport.scroll_margin = 2;

        while self.running {
            terminal.draw(|frame| frame.render_widget(&self, frame.area()))?;
            match self.events.next().await? {
                Event::Tick => self.tick(),
                Event::Crossterm(event) => match event {
                    crossterm::event::Event::Key(key_event) => self.handle_key_events(key_event)?,
                    crossterm::event::Event::Resize(_, y) => {
                        self.viewport.resize(y.saturating_sub(2) as usize);
                        self.viewport.list_changed(self.total_rows());
                    }
                    _ => {}
                },
                Event::Load(load_event) => self.handle_load_event(load_event)?,
                Event::App(app_event) => self.handle_app_event(app_event)?,
            }
        }
        Ok(())
    }

    fn handle_app_event(&mut self, app_event: AppEvent) -> color_eyre::Result<()> {
        match app_event {
            AppEvent::Quit => self.quit(),
            AppEvent::Confirm => match self.app_state.clone() {
                AppState::LogView => self.events.send(AppEvent::ToggleGroup),
                AppState::SearchMode => {
                    let query = self.input_query.trim().to_string();
                    self.apply_filter(|filter| filter.with_search(Some(query)))?;
                    self.next_state(AppState::LogView);
                }
                AppState::GroupsView => {
                    self.message_offset = 0;
                    let selection = self.group_selection();
                    self.next_state(AppState::MessagesView(selection));
                }
                AppState::RenameMode(group_id) => {
                    let name = self.input_query.clone();
                    match self.engine.dispatch(Command::Rename { group_id, name }) {
                        Ok(_) => self.next_state(AppState::GroupsView),
                        Err(e) => self.next_state(AppState::ErrorState(format!(
                            "Failed to save group name\nError: {}",
                            e
                        ))),
                    }
                }
                AppState::ConfirmLargeFile(_) => {
                    self.engine.dispatch(Command::Reload)?;
                    self.next_state(AppState::LogView);
                }
                _ => {}
            },
            AppEvent::Cancel => {
                if self.show_help {
                    self.show_help = false;
                    return Ok(());
                }
                match self.app_state {
                    AppState::LogView => {
                        if self.engine.filter().search_text().is_some() {
                            self.apply_filter(|filter| filter.with_search(None))?;
                        }
                    }
                    AppState::MessagesView(_) | AppState::RenameMode(_) => {
                        self.next_state(AppState::GroupsView)
                    }
                    AppState::ConfirmLargeFile(_) => self.quit(),
                    _ => self.next_state(AppState::LogView),
                }
            }
            AppEvent::MoveUp => match self.app_state {
                AppState::GroupsView => self.group_selected = self.group_selected.saturating_sub(1),
                AppState::MessagesView(_) => {
                    self.message_offset = self.message_offset.saturating_sub(1)
                }
                _ => self.viewport.move_up(self.total_rows()),
            },
            AppEvent::MoveDown => match &self.app_state {
                AppState::GroupsView => {
                    if self.group_selected < self.engine.groups().len() {
                        self.group_selected += 1;
                    }
                }
                AppState::MessagesView(selection) => {
                    let count = self.engine.groups().messages_for(selection).len();
                    if self.message_offset + 1 < count {
                        self.message_offset += 1;
                    }
                }
                _ => self.viewport.move_down(self.total_rows()),
            },
            AppEvent::PageUp => self.viewport.page_up(self.total_rows()),
            AppEvent::PageDown => self.viewport.page_down(self.total_rows()),
            AppEvent::GotoTop => self.viewport.goto_top(self.total_rows()),
            AppEvent::GotoBottom => self.viewport.goto_bottom(self.total_rows()),
            AppEvent::ToggleLevel(level) => {
                self.apply_filter(|filter| {
                    let mut levels = filter.levels();
                    levels.toggle(level);
                    filter.with_levels(levels)
                })?;
            }
            AppEvent::ActivateSearchMode => {
                self.input_query = self.engine.filter().search_text().unwrap_or_default().to_string();
                self.next_state(AppState::SearchMode);
            }
            AppEvent::ToggleCollapse => {
                self.apply_filter(|filter| {
                    let collapse = !filter.collapse_repeats();
                    filter.with_collapse(collapse)
                })?;
            }
            AppEvent::ToggleGroup => {
                if let Some(index) = self.renderer.row_index(self.viewport.selected_line)
                    && self.renderer.toggle_group(index)
                {
                    self.viewport.list_changed(self.total_rows());
                }
            }
            AppEvent::ExpandAll | AppEvent::CollapseAll => {
                let index = self.renderer.row_index(self.viewport.selected_line);
                if app_event == AppEvent::ExpandAll {
                    self.renderer.expand_all();
                } else {
                    self.renderer.collapse_all();
                }
                if let Some(index) = index {
                    self.viewport.selected_line = self.renderer.row_of(index);
                }
                self.viewport.list_changed(self.total_rows());
            }
            AppEvent::ToggleAutoUpdate => {
                self.auto_update = !self.auto_update;
                self.last_tail_check = Instant::now();
                info!("Auto-update {}", if self.auto_update { "on" } else { "off" });
            }
            AppEvent::ToggleFollowMode => {
                self.viewport.follow = !self.viewport.follow;
                if self.viewport.follow {
                    self.viewport.goto_bottom(self.total_rows());
                }
            }
            AppEvent::Reload => {
                self.engine.dispatch(Command::Reload)?;
            }
            AppEvent::ToggleHelp => self.show_help = !self.show_help,
            AppEvent::ActivateGroupsView => {
                self.group_selected = 0;
                self.next_state(AppState::GroupsView);
            }
            AppEvent::ActivateRenameMode => {
                if let Selection::Group(group_id) = self.group_selection()
                    && let Some(group) = self.engine.groups().get(&group_id)
                {
                    self.input_query = group.display_name.clone();
                    self.next_state(AppState::RenameMode(group_id));
                }
            }
            AppEvent::ToggleStatistics => {
                if self.app_state == AppState::StatisticsView {
                    self.next_state(AppState::LogView);
                } else {
                    self.next_state(AppState::StatisticsView);
                }
            }
        }
        Ok(())
    }

    /// Handles the key events and updates the state of [`App`].
    pub fn handle_key_events(&mut self, key_event: KeyEvent) -> color_eyre::Result<()> {
        // Global keybindings
        match key_event.code {
            KeyCode::Char('c') if key_event.modifiers == KeyModifiers::CONTROL => {
                self.events.send(AppEvent::Quit)
            }
            KeyCode::Esc => self.events.send(AppEvent::Cancel),
            KeyCode::Enter => self.events.send(AppEvent::Confirm),
            _ => {}
        }
        let typing = !key_event.modifiers.contains(KeyModifiers::CONTROL);

        match self.app_state {
            AppState::ErrorState(_) => {
                if let KeyCode::Char('q') = key_event.code {
                    self.events.send(AppEvent::Quit);
                }
            }

            AppState::ConfirmLargeFile(_) => match key_event.code {
                KeyCode::Char('y') => self.events.send(AppEvent::Confirm),
                KeyCode::Char('n') | KeyCode::Char('q') => self.events.send(AppEvent::Quit),
                _ => {}
            },

            // LogView (Normal Mode)
            AppState::LogView => match key_event.code {
                KeyCode::Up | KeyCode::Char('k') => self.events.send(AppEvent::MoveUp),
                KeyCode::Down | KeyCode::Char('j') => self.events.send(AppEvent::MoveDown),
                KeyCode::PageUp => self.events.send(AppEvent::PageUp),
                KeyCode::PageDown => self.events.send(AppEvent::PageDown),
                KeyCode::Char('g') | KeyCode::Home => self.events.send(AppEvent::GotoTop),
                KeyCode::Char('G') | KeyCode::End => self.events.send(AppEvent::GotoBottom),
                KeyCode::Char(c @ '1'..='5') => {
                    let level = LogLevel::ALL[(c as u8 - b'1') as usize];
                    self.events.send(AppEvent::ToggleLevel(level));
                }
                KeyCode::Char('/') => self.events.send(AppEvent::ActivateSearchMode),
                KeyCode::Char('f') if key_event.modifiers == KeyModifiers::CONTROL => {
                    self.events.send(AppEvent::ActivateSearchMode)
                }
                KeyCode::Char('c') if typing => self.events.send(AppEvent::ToggleCollapse),
                KeyCode::Char(' ') => self.events.send(AppEvent::ToggleGroup),
                KeyCode::Char('e') => self.events.send(AppEvent::ExpandAll),
                KeyCode::Char('E') => self.events.send(AppEvent::CollapseAll),
                KeyCode::Char('a') => self.events.send(AppEvent::ToggleAutoUpdate),
                KeyCode::Char('t') => self.events.send(AppEvent::ToggleFollowMode),
                KeyCode::Char('r') | KeyCode::F(5) => self.events.send(AppEvent::Reload),
                KeyCode::Char('n') => self.events.send(AppEvent::ActivateGroupsView),
                KeyCode::Char('s') => self.events.send(AppEvent::ToggleStatistics),
                KeyCode::Char('h') | KeyCode::F(1) => self.events.send(AppEvent::ToggleHelp),
                KeyCode::Char('q') => self.events.send(AppEvent::Quit),
                _ => {}
            },

            // SearchMode and RenameMode edit the input line
            AppState::SearchMode | AppState::RenameMode(_) => match key_event.code {
                KeyCode::Backspace => {
                    self.input_query.pop();
                }
                KeyCode::Char(c) if typing => self.input_query.push(c),
                _ => {}
            },

            AppState::GroupsView => match key_event.code {
                KeyCode::Up | KeyCode::Char('k') => self.events.send(AppEvent::MoveUp),
                KeyCode::Down | KeyCode::Char('j') => self.events.send(AppEvent::MoveDown),
                KeyCode::Char('r') | KeyCode::Char('R') => {
                    self.events.send(AppEvent::ActivateRenameMode)
                }
                KeyCode::Char('n') => self.events.send(AppEvent::Cancel),
                KeyCode::Char('q') => self.events.send(AppEvent::Quit),
                _ => {}
            },

            AppState::MessagesView(_) => match key_event.code {
                KeyCode::Up | KeyCode::Char('k') => self.events.send(AppEvent::MoveUp),
                KeyCode::Down | KeyCode::Char('j') => self.events.send(AppEvent::MoveDown),
                KeyCode::Char('q') => self.events.send(AppEvent::Quit),
                _ => {}
            },

            AppState::StatisticsView => match key_event.code {
                KeyCode::Char('s') => self.events.send(AppEvent::ToggleStatistics),
                KeyCode::Char('q') => self.events.send(AppEvent::Quit),
                _ => {}
            },
        }
        Ok(())
    }

    /// Runs a tail check whenever the auto-update interval has passed.
    pub fn tick(&mut self) {
        if self.auto_update && self.last_tail_check.elapsed() >= self.auto_update_interval {
            self.last_tail_check = Instant::now();
            self.engine.tail_check();
        }
    }

    /// Set running to false to quit the application.
    pub fn quit(&mut self) {
        self.running = false;
    }
}
