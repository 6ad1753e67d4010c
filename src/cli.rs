use crate::config::Config;
use crate::error::TailError;
use crate::tailer;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Log file, or a folder whose newest log is opened
    pub path: String,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Write diagnostics to this file (filtered by RUST_LOG)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Print the filtered log to stdout instead of opening the viewer
    #[arg(long)]
    pub dump: bool,

    /// Print the notification groups and messages as JSON
    #[arg(long, conflicts_with = "dump")]
    pub export: bool,

    /// Minimum run length that gets collapsed
    #[arg(short, long)]
    pub threshold: Option<usize>,

    /// Show repeated lines without collapsing them
    #[arg(long)]
    pub no_collapse: bool,

    /// Start with auto-update on and keep the last line selected
    #[arg(short, long)]
    pub follow: bool,
}

impl Cli {
    /// Command line values take precedence over the config file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.filter.collapse_threshold = threshold;
        }
        if self.no_collapse {
            config.filter.collapse_repeats = false;
        }
        if self.follow {
            config.tail.auto_update = true;
        }
    }

    /// The log file to open. For a folder this is its most recently modified
    /// `<log_prefix>*<log_suffix>` file.
    pub fn resolve_path(&self, config: &Config) -> Result<PathBuf, TailError> {
        let path = PathBuf::from(&self.path);
        if path.is_dir() {
            return tailer::latest_log_in(&path, &config.tail.log_prefix, &config.tail.log_suffix)
                .ok_or(TailError::NotFound(path));
        }
        if path.is_file() {
            Ok(path)
        } else {
            Err(TailError::NotFound(path))
        }
    }
}
