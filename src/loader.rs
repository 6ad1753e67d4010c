use crate::collapse::DisplayList;
use crate::error::TailError;
use crate::group::GroupIndex;
use crate::notification::{IncrementalExtractor, NotificationExtractor, NotificationRecord};
use crate::overrides::GroupNameOverrides;
use crate::parser::LineParser;
use crate::record::LogRecord;
use crate::tailer::{self, TailHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lines parsed between two progress events.
const PARSE_CHUNK: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Replaces everything installed.
    Full,
    /// Follows what is installed.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Reading,
    Parsing { lines: usize, total: usize },
    Extracting { markers: usize },
    /// Building the display list from the installed records.
    Filtering { records: usize, total: usize },
}

/// Result of one load, tagged with the generation that requested it.
#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub kind: LoadKind,
    pub records: Vec<Arc<LogRecord>>,
    pub notifications: Vec<NotificationRecord>,
    /// Rebuilt index, full loads only.
    pub groups: Option<GroupIndex>,
    /// The first record completes the last installed one, which was read
    /// without its line end.
    pub replaces_last: bool,
    /// Bytes consumed from the file after this load.
    pub offset: u64,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.notifications.is_empty()
    }
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress { generation: u64, stage: LoadStage },
    Loaded(Snapshot),
    Failed {
        generation: u64,
        error: TailError,
        /// The failed load was a full one.
        initial: bool,
    },
    /// Display list built off the interaction thread for filter pass `pass`.
    Filtered {
        generation: u64,
        pass: u64,
        display: Arc<DisplayList>,
    },
}

#[derive(Debug, Clone)]
pub enum LoadRequest {
    Full {
        generation: u64,
        overrides: GroupNameOverrides,
    },
    Tail {
        generation: u64,
    },
}

impl LoadRequest {
    fn generation(&self) -> u64 {
        match self {
            LoadRequest::Full { generation, .. } | LoadRequest::Tail { generation } => *generation,
        }
    }
}

struct TailState {
    handle: TailHandle,
    /// Last line of the file when it had no line end yet.
    open_line: String,
    notifications: IncrementalExtractor,
}

/// Reads, parses and extracts one log file. Owns the tail position.
pub struct Loader {
    path: PathBuf,
    parser: LineParser,
    extractor: NotificationExtractor,
    overrides: GroupNameOverrides,
    state: Option<TailState>,
}

impl Loader {
    pub fn new(path: PathBuf, parser: LineParser, extractor: NotificationExtractor) -> Self {
        Self {
            path,
            parser,
            extractor,
            overrides: GroupNameOverrides::default(),
            state: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Offset consumed so far, if the file was loaded.
    pub fn offset(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.handle.offset())
    }

    /// Reads the whole file and rebuilds the group index.
    pub fn load_full(
        &mut self,
        generation: u64,
        progress: &dyn Fn(LoadEvent),
    ) -> Result<Snapshot, TailError> {
        let started = Instant::now();
        progress(LoadEvent::Progress {
            generation,
            stage: LoadStage::Reading,
        });

        let mut handle = tailer::open(self.path.clone())?;
        let text = tailer::full_reload(&mut handle)?;

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut records = Vec::with_capacity(lines.len());
        for chunk in lines.chunks(PARSE_CHUNK) {
            records.extend(self.parser.parse_lines(chunk));
            progress(LoadEvent::Progress {
                generation,
                stage: LoadStage::Parsing {
                    lines: records.len(),
                    total: lines.len(),
                },
            });
        }

        let mut notifications = IncrementalExtractor::new(self.extractor.clone());
        let found = notifications.feed_with_progress(&text, |markers| {
            progress(LoadEvent::Progress {
                generation,
                stage: LoadStage::Extracting { markers },
            })
        });
        let groups = GroupIndex::rebuild(&found, &self.overrides, &self.extractor);

        info!(
            "Loaded {} records, {} notifications in {} groups from {} in {:?}",
            records.len(),
            found.len(),
            groups.len(),
            self.path.display(),
            started.elapsed()
        );

        let offset = handle.offset();
        self.state = Some(TailState {
            handle,
            open_line: open_line(&text).to_string(),
            notifications,
        });

        Ok(Snapshot {
            generation,
            kind: LoadKind::Full,
            records,
            notifications: found,
            groups: Some(groups),
            replaces_last: false,
            offset,
        })
    }

    /// Reads what was appended since the last load. Falls back to a full load
    /// when nothing was loaded yet or the file was rotated.
    pub fn load_tail(
        &mut self,
        generation: u64,
        progress: &dyn Fn(LoadEvent),
    ) -> Result<Snapshot, TailError> {
        let Some(state) = self.state.as_mut() else {
            return self.load_full(generation, progress);
        };

        let new = match tailer::read_new(&mut state.handle) {
            Ok(new) => new,
            Err(e) if e.is_rotation() => {
                warn!("{}; reloading {}", e, self.path.display());
                return self.load_full(generation, progress);
            }
            Err(e) => return Err(e),
        };

        let offset = state.handle.offset();
        if new.is_empty() {
            return Ok(Snapshot {
                generation,
                kind: LoadKind::Append,
                records: Vec::new(),
                notifications: Vec::new(),
                groups: None,
                replaces_last: false,
                offset,
            });
        }

        let replaces_last = !state.open_line.trim().is_empty();
        let mut combined = std::mem::take(&mut state.open_line);
        combined.push_str(&new.text);

        let lines: Vec<&str> = combined.lines().filter(|l| !l.trim().is_empty()).collect();
        let records = self.parser.parse_lines(&lines);
        state.open_line = open_line(&combined).to_string();

        let notifications = state.notifications.feed(&new.text);
        debug!(
            "Appended {} records and {} notifications ({} bytes)",
            records.len(),
            notifications.len(),
            new.to - new.from
        );

        Ok(Snapshot {
            generation,
            kind: LoadKind::Append,
            records,
            notifications,
            groups: None,
            replaces_last,
            offset,
        })
    }

    /// Runs one request, reporting through `progress`.
    pub fn handle(&mut self, request: LoadRequest, progress: &dyn Fn(LoadEvent)) {
        let generation = request.generation();
        let (result, initial) = match request {
            LoadRequest::Full { overrides, .. } => {
                self.overrides = overrides;
                (self.load_full(generation, progress), true)
            }
            LoadRequest::Tail { .. } => (self.load_tail(generation, progress), false),
        };

        match result {
            Ok(snapshot) => progress(LoadEvent::Loaded(snapshot)),
            Err(error) => {
                warn!("Loading {} failed: {}", self.path.display(), error);
                progress(LoadEvent::Failed {
                    generation,
                    error,
                    initial,
                })
            }
        }
    }
}

/// Trailing text after the last line end.
fn open_line(text: &str) -> &str {
    match text.rfind('\n') {
        Some(nl) => &text[nl + 1..],
        None => text,
    }
}

/// Handle to the loader task running off the interaction thread.
#[derive(Debug, Clone)]
pub struct LoaderHandle {
    request_tx: mpsc::UnboundedSender<LoadRequest>,
}

impl LoaderHandle {
    /// Spawns the loader task. Each request runs on the blocking pool.
    pub fn spawn(loader: Loader, events: mpsc::UnboundedSender<LoadEvent>) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(loader, request_rx, events));
        Self { request_tx }
    }

    pub fn request(&self, request: LoadRequest) {
        let _ = self.request_tx.send(request);
    }
}

async fn run(
    mut loader: Loader,
    mut requests: mpsc::UnboundedReceiver<LoadRequest>,
    events: mpsc::UnboundedSender<LoadEvent>,
) {
    while let Some(first) = requests.recv().await {
        let request = coalesce(first, &mut requests);
        let tx = events.clone();

        let joined = tokio::task::spawn_blocking(move || {
            loader.handle(request, &|event| {
                let _ = tx.send(event);
            });
            loader
        })
        .await;

        match joined {
            Ok(back) => loader = back,
            Err(e) => {
                warn!("Loader task stopped: {}", e);
                break;
            }
        }

        if events.is_closed() {
            break;
        }
    }
}

/// Folds queued requests into one: the newest full load wins over tails.
fn coalesce(
    first: LoadRequest,
    requests: &mut mpsc::UnboundedReceiver<LoadRequest>,
) -> LoadRequest {
    let mut chosen = first;
    while let Ok(next) = requests.try_recv() {
        let next_is_full = matches!(next, LoadRequest::Full { .. });
        if next_is_full || !matches!(chosen, LoadRequest::Full { .. }) {
            chosen = next;
        }
    }
    chosen
}
