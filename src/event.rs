use crate::loader::LoadEvent;
use crate::record::LogLevel;
use color_eyre::eyre::OptionExt;
use futures::{FutureExt, StreamExt};
use ratatui::crossterm::event::Event as CrosstermEvent;
use std::time::Duration;
use tokio::sync::mpsc;

/// The frequency at which tick events are emitted.
const TICK_FPS: f64 = 30.0;

/// Representation of all possible events.
#[derive(Debug)]
pub enum Event {
    /// Emitted on a fixed schedule. Drives the auto-update timer.
    Tick,
    /// Crossterm events.
    Crossterm(CrosstermEvent),
    /// Progress and results from the loader task.
    Load(LoadEvent),
    /// Application events.
    App(AppEvent),
}

/// Application events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppEvent {
    Quit,
    Confirm,
    Cancel,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    GotoTop,
    GotoBottom,
    /// Show or hide one level
    ToggleLevel(LogLevel),
    ActivateSearchMode,
    ToggleCollapse,
    /// Open or fold the collapsed span under the selection
    ToggleGroup,
    ExpandAll,
    CollapseAll,
    ToggleAutoUpdate,
    ToggleFollowMode,
    Reload,
    ToggleHelp,
    ActivateGroupsView,
    ActivateRenameMode,
    ToggleStatistics,
}

/// Terminal event handler.
#[derive(Debug)]
pub struct EventHandler {
    /// Event sender channel.
    sender: mpsc::UnboundedSender<Event>,
    /// Event receiver channel.
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler {
    /// Constructs a new instance of [`EventHandler`] and spawns the terminal
    /// event task.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = EventTask::new(sender.clone());
        tokio::spawn(async { actor.run().await });
        Self { sender, receiver }
    }

    /// A sender for the loader. Its events arrive here as [`Event::Load`].
    pub fn load_sender(&self) -> mpsc::UnboundedSender<LoadEvent> {
        let (load_tx, mut load_rx) = mpsc::unbounded_channel();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            while let Some(event) = load_rx.recv().await {
                if sender.send(Event::Load(event)).is_err() {
                    break;
                }
            }
        });
        load_tx
    }

    /// Receives an event from the sender.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender channel is disconnected, which only
    /// happens when the terminal event task failed.
    pub async fn next(&mut self) -> color_eyre::Result<Event> {
        self.receiver
            .recv()
            .await
            .ok_or_eyre("Failed to receive event")
    }

    /// Queue an app event for the next iteration of the event loop.
    pub fn send(&mut self, app_event: AppEvent) {
        // The receiver lives as long as this struct.
        let _ = self.sender.send(Event::App(app_event));
    }
}

/// Reads crossterm events and emits tick events on a regular schedule.
struct EventTask {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventTask {
    fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        Self { sender }
    }

    async fn run(self) -> color_eyre::Result<()> {
        let tick_rate = Duration::from_secs_f64(1.0 / TICK_FPS);
        let mut reader = crossterm::event::EventStream::new();
        let mut tick = tokio::time::interval(tick_rate);
        loop {
            let tick_delay = tick.tick();
            let crossterm_event = reader.next().fuse();
            tokio::select! {
              _ = self.sender.closed() => {
                break;
              }
              _ = tick_delay => {
                self.send(Event::Tick);
              }
              Some(Ok(evt)) = crossterm_event => {
                self.send(Event::Crossterm(evt));
              }
            };
        }
        Ok(())
    }

    fn send(&self, event: Event) {
        // Fails only after the app dropped the receiver on shutdown.
        let _ = self.sender.send(event);
    }
}
