use crate::collapse::DisplayList;
use crate::config::Config;
use crate::error::{ConfigError, OverrideStoreError};
use crate::filter::{FilterConfig, FilterPipeline};
use crate::group::{ExportBatch, GroupIndex, Selection};
use crate::loader::{LoadEvent, LoadKind, LoadRequest, LoadStage, Loader, LoaderHandle, Snapshot};
use crate::notification::NotificationExtractor;
use crate::overrides::{GroupNameOverrides, OverrideStore};
use crate::record::LogRecord;
use crate::statistics::Statistics;
use crate::viewport::DisplaySink;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Operations the front-end asks of the engine.
#[derive(Debug, Clone)]
pub enum Command {
    Reload,
    ApplyFilter(FilterConfig),
    Rename { group_id: String, name: String },
    Export(Selection),
    TailCheck,
}

/// What the status line shows about loading.
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub loading: bool,
    pub stage: Option<LoadStage>,
    /// Set when the last full load failed.
    pub load_error: Option<String>,
    /// Last incremental problem, cleared by the next good read.
    pub warning: Option<String>,
    pub last_update: Option<DateTime<Local>>,
    pub bytes_read: u64,
    /// A display list is being built on the blocking pool.
    pub filtering: bool,
}

/// Installed log state and the operations on it.
///
/// Loads run on the loader task and display lists are built on the blocking
/// pool. Both are installed through [`handle_event`](Self::handle_event) only
/// when they belong to the current generation; a display list also has to
/// belong to the latest filter pass.
pub struct Engine {
    path: PathBuf,
    generation: u64,
    filter_pass: u64,
    events: mpsc::UnboundedSender<LoadEvent>,
    loader: LoaderHandle,
    extractor: NotificationExtractor,
    records: Arc<Vec<Arc<LogRecord>>>,
    groups: GroupIndex,
    overrides: GroupNameOverrides,
    store: OverrideStore,
    filter: FilterConfig,
    display: Arc<DisplayList>,
    tail_pending: bool,
    status: EngineStatus,
}

impl Engine {
    /// Creates the engine and spawns its loader task. Nothing is read until
    /// [`reload`](Self::reload).
    pub fn new(
        path: PathBuf,
        config: &Config,
        events: mpsc::UnboundedSender<LoadEvent>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let parser = config.build_parser()?;
        let extractor = NotificationExtractor::new(config.extractor_config());
        let store = OverrideStore::new(config.overrides_path());
        let overrides = store.load();

        let loader = Loader::new(path.clone(), parser, extractor.clone());
        Ok(Self {
            path,
            generation: 0,
            filter_pass: 0,
            loader: LoaderHandle::spawn(loader, events.clone()),
            events,
            extractor,
            records: Arc::new(Vec::new()),
            groups: GroupIndex::default(),
            overrides,
            store,
            filter: config.filter_config()?,
            display: Arc::new(DisplayList::default()),
            tail_pending: false,
            status: EngineStatus::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn records(&self) -> &[Arc<LogRecord>] {
        &self.records
    }

    pub fn groups(&self) -> &GroupIndex {
        &self.groups
    }

    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    pub fn display(&self) -> &Arc<DisplayList> {
        &self.display
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::collect(&self.records, &self.groups)
    }

    /// Runs a command. Only exports produce a value.
    pub fn dispatch(&mut self, command: Command) -> Result<Option<ExportBatch>, OverrideStoreError> {
        match command {
            Command::Reload => {
                self.reload();
            }
            Command::ApplyFilter(config) => self.apply_filter(config),
            Command::Rename { group_id, name } => {
                self.rename(&group_id, &name)?;
            }
            Command::Export(selection) => return Ok(Some(self.export(&selection))),
            Command::TailCheck => self.tail_check(),
        }
        Ok(None)
    }

    /// Starts a full load. Results of earlier loads are ignored from now on.
    pub fn reload(&mut self) -> u64 {
        self.generation += 1;
        self.status.loading = true;
        self.status.stage = None;
        self.status.filtering = false;
        self.tail_pending = false;
        info!("Reloading {} (generation {})", self.path.display(), self.generation);
        self.loader.request(LoadRequest::Full {
            generation: self.generation,
            overrides: self.overrides.clone(),
        });
        self.generation
    }

    /// Asks the loader for appended text unless a load is already underway.
    pub fn tail_check(&mut self) {
        if self.status.loading || self.tail_pending || self.generation == 0 {
            return;
        }
        self.tail_pending = true;
        self.loader.request(LoadRequest::Tail {
            generation: self.generation,
        });
    }

    /// Rebuilds the display list from the installed records. The new list
    /// arrives as [`LoadEvent::Filtered`].
    pub fn apply_filter(&mut self, config: FilterConfig) {
        self.filter = config;
        self.refilter();
    }

    /// Starts a filter pass on the blocking pool. Earlier passes still
    /// running are dropped when they finish.
    fn refilter(&mut self) {
        self.filter_pass += 1;
        self.status.filtering = true;

        let (generation, pass) = (self.generation, self.filter_pass);
        let records = Arc::clone(&self.records);
        let config = self.filter.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let total = records.len();
            let display = FilterPipeline::apply_with_progress(&records, &config, |done| {
                let _ = events.send(LoadEvent::Progress {
                    generation,
                    stage: LoadStage::Filtering {
                        records: done,
                        total,
                    },
                });
            });
            let _ = events.send(LoadEvent::Filtered {
                generation,
                pass,
                display: Arc::new(display),
            });
        });
    }

    /// Renames a group and persists the override. Returns false for an
    /// unknown group.
    pub fn rename(&mut self, group_id: &str, name: &str) -> Result<bool, OverrideStoreError> {
        let Some(change) = self.groups.rename(group_id, name) else {
            return Ok(false);
        };
        self.overrides.set(&change.group_id, &change.name);
        self.store.save(&self.overrides)?;
        info!("Renamed group {} to {:?}", change.group_id, change.name);
        Ok(true)
    }

    pub fn export(&self, selection: &Selection) -> ExportBatch {
        self.groups.export(selection)
    }

    /// Applies a loader event. Returns true when the display list changed.
    pub fn handle_event(&mut self, event: LoadEvent) -> bool {
        match event {
            LoadEvent::Progress { generation, stage } => {
                let filtering = matches!(stage, LoadStage::Filtering { .. });
                if generation == self.generation && (!filtering || !self.status.loading) {
                    self.status.stage = Some(stage);
                }
                false
            }
            LoadEvent::Loaded(snapshot) => {
                self.install(snapshot);
                false
            }
            LoadEvent::Filtered {
                generation,
                pass,
                display,
            } => {
                if generation != self.generation || pass != self.filter_pass {
                    debug!("Dropping display list of filter pass {}", pass);
                    return false;
                }
                self.display = display;
                self.status.filtering = false;
                if matches!(self.status.stage, Some(LoadStage::Filtering { .. })) {
                    self.status.stage = None;
                }
                true
            }
            LoadEvent::Failed {
                generation,
                error,
                initial,
            } => {
                if generation != self.generation {
                    return false;
                }
                self.tail_pending = false;
                if initial {
                    self.status.loading = false;
                    self.status.load_error = Some(error.to_string());
                } else {
                    warn!("Tail check failed: {}", error);
                    self.status.warning = Some(error.to_string());
                }
                false
            }
        }
    }

    /// Installs a snapshot of the current generation and starts rebuilding
    /// the display list. Returns false for stale or empty snapshots.
    pub fn install(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.generation != self.generation {
            debug!(
                "Dropping stale snapshot of generation {} (current {})",
                snapshot.generation, self.generation
            );
            return false;
        }

        self.status.bytes_read = snapshot.offset;
        self.status.last_update = Some(Local::now());
        self.status.warning = None;
        self.tail_pending = false;

        match snapshot.kind {
            LoadKind::Full => {
                self.status.loading = false;
                self.status.stage = None;
                self.status.load_error = None;
                self.records = Arc::new(snapshot.records);
                let mut groups = snapshot.groups.unwrap_or_else(|| {
                    GroupIndex::rebuild(&snapshot.notifications, &self.overrides, &self.extractor)
                });
                // Renames made while the load was running.
                groups.apply_overrides(&self.overrides);
                self.groups = groups;
                info!(
                    "Installed generation {}: {} records, {} groups",
                    self.generation,
                    self.records.len(),
                    self.groups.len()
                );
            }
            LoadKind::Append => {
                if snapshot.is_empty() {
                    return false;
                }
                let records = Arc::make_mut(&mut self.records);
                if snapshot.replaces_last {
                    records.pop();
                }
                records.extend(snapshot.records);
                self.groups
                    .append(&snapshot.notifications, &self.overrides, &self.extractor);
                debug!("Installed append, {} records total", self.records.len());
            }
        }

        self.refilter();
        true
    }

    /// Hands the current display list to a sink.
    pub fn publish(&self, sink: &mut dyn DisplaySink) -> io::Result<()> {
        sink.accept(Arc::clone(&self.display))
    }
}
