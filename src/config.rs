use crate::error::ConfigError;
use crate::filter::{FilterConfig, LevelSet};
use crate::matcher::PatternMatcher;
use crate::notification::{ExtractorConfig, GroupRule};
use crate::parser::{LevelPattern, LineParser, ParserOptions};
use crate::record::LogLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TRUNCATE_THRESHOLD: usize = 200;
pub const DEFAULT_COLLAPSE_THRESHOLD: usize = 3;
pub const DEFAULT_AUTO_UPDATE_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_LARGE_FILE_WARNING_MB: u64 = 10;
pub const DEFAULT_NOTIFICATION_MARKER: &str = "Received Notification:";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(skip)]
    path: Option<String>,
    #[serde(default)]
    pub parser: ParserSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub tail: TailSection,
    #[serde(default)]
    pub notifications: NotificationSection,
    /// Where group-name overrides are persisted. Defaults to the config dir.
    #[serde(default)]
    pub overrides_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserSection {
    #[serde(default = "default_true")]
    pub truncate: bool,
    #[serde(default = "default_truncate_threshold")]
    pub truncate_threshold: usize,
    /// Ordered level keyword table. First matching entry wins.
    #[serde(default = "default_level_patterns")]
    pub levels: Vec<LevelPatternConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LevelPatternConfig {
    /// Substring or regex searched anywhere in the line.
    pub pattern: String,
    #[serde(default)]
    pub regex: bool,
    pub level: LogLevel,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterSection {
    #[serde(default = "default_true")]
    pub collapse_repeats: bool,
    #[serde(default = "default_collapse_threshold")]
    pub collapse_threshold: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TailSection {
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_large_file_warning_mb")]
    pub large_file_warning_mb: u64,
    /// File name prefix used when a folder is opened.
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_suffix")]
    pub log_suffix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationSection {
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Keyword rules classifying payloads that carry no group id.
    #[serde(default = "default_group_rules")]
    pub groups: Vec<GroupRuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupRuleConfig {
    pub id: String,
    pub name: String,
    /// The message must contain at least one of these.
    pub keywords: Vec<String>,
    /// When not empty, the message must also contain one of these.
    #[serde(default)]
    pub also: Vec<String>,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            truncate: true,
            truncate_threshold: DEFAULT_TRUNCATE_THRESHOLD,
            levels: default_level_patterns(),
        }
    }
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            collapse_repeats: true,
            collapse_threshold: DEFAULT_COLLAPSE_THRESHOLD,
        }
    }
}

impl Default for TailSection {
    fn default() -> Self {
        Self {
            auto_update: false,
            interval_ms: DEFAULT_AUTO_UPDATE_INTERVAL_MS,
            large_file_warning_mb: DEFAULT_LARGE_FILE_WARNING_MB,
            log_prefix: default_log_prefix(),
            log_suffix: default_log_suffix(),
        }
    }
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            groups: default_group_rules(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_truncate_threshold() -> usize {
    DEFAULT_TRUNCATE_THRESHOLD
}

fn default_collapse_threshold() -> usize {
    DEFAULT_COLLAPSE_THRESHOLD
}

fn default_interval_ms() -> u64 {
    DEFAULT_AUTO_UPDATE_INTERVAL_MS
}

fn default_large_file_warning_mb() -> u64 {
    DEFAULT_LARGE_FILE_WARNING_MB
}

fn default_log_prefix() -> String {
    "output_log_".to_string()
}

fn default_log_suffix() -> String {
    ".txt".to_string()
}

fn default_marker() -> String {
    DEFAULT_NOTIFICATION_MARKER.to_string()
}

fn default_level_patterns() -> Vec<LevelPatternConfig> {
    [
        ("error", LogLevel::Error),
        ("exception", LogLevel::Error),
        ("warning", LogLevel::Warning),
        ("warn", LogLevel::Warning),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
    ]
    .into_iter()
    .map(|(pattern, level)| LevelPatternConfig {
        pattern: pattern.to_string(),
        regex: false,
        level,
    })
    .collect()
}

fn default_group_rules() -> Vec<GroupRuleConfig> {
    fn rule(id: &str, name: &str, keywords: &[&str], also: &[&str]) -> GroupRuleConfig {
        GroupRuleConfig {
            id: id.to_string(),
            name: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            also: also.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        rule("group_earthquake", "🔔 地震情報", &["震度", "地震"], &[]),
        rule("group_bar", "🍺 Bar/開店情報", &["开店", "開店", "Bar", "NBB"], &[]),
        rule("group_guild", "⚔️ ギルド/公会", &["公会", "ギルド"], &[]),
        rule("group_tourism", "🗺️ 観光部", &["观光", "観光"], &[]),
        rule("group_game", "🎮 ゲーム情報", &["职业", "Achievement"], &[]),
        rule("group_village", "🏘️ 村/開村情報", &["村"], &["開", "开"]),
    ]
}

impl Config {
    /// Load configuration from the given path, the default config dir
    /// (~/.config/lognote/) or a local .lognote.toml.
    pub fn load(path: &Option<String>) -> Self {
        let config_path = if let Some(p) = path {
            PathBuf::from(p)
        } else {
            Self::default_config_path()
        };
        Self::load_from_path(&config_path)
    }

    fn load_from_path(config_path: &Path) -> Self {
        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(config_path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(mut config) => {
                    info!("Loaded config from {}", config_path.display());
                    config.path = config_path.to_str().map(|s| s.to_string());
                    config
                }
                Err(e) => {
                    warn!("Ignoring config {}: {}", config_path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config {}: {}", config_path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Get the path of the configuration file if it was loaded from a file.
    pub fn get_path(&self) -> Option<&String> {
        self.path.as_ref()
    }

    fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("lognote").join("config.toml");
            if config_path.exists() {
                return config_path;
            }
        }
        PathBuf::from(".lognote.toml")
    }

    /// Location of the group-name-override store.
    pub fn overrides_path(&self) -> PathBuf {
        if let Some(p) = &self.overrides_path {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .map(|dir| dir.join("lognote"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("group_names.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.collapse_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(0));
        }
        if self.parser.truncate_threshold == 0 {
            return Err(ConfigError::InvalidTruncateThreshold);
        }
        self.level_patterns().map(|_| ())
    }

    pub fn auto_update_interval(&self) -> Duration {
        Duration::from_millis(self.tail.interval_ms.max(100))
    }

    pub fn large_file_warning_bytes(&self) -> u64 {
        self.tail.large_file_warning_mb.saturating_mul(1024 * 1024)
    }

    fn level_patterns(&self) -> Result<Vec<LevelPattern>, ConfigError> {
        self.parser
            .levels
            .iter()
            .map(|entry| {
                Ok(LevelPattern {
                    matcher: PatternMatcher::new(&entry.pattern, entry.regex)?,
                    level: entry.level,
                })
            })
            .collect()
    }

    /// Builds a LineParser from the configuration.
    pub fn build_parser(&self) -> Result<LineParser, ConfigError> {
        let options = ParserOptions {
            truncate: self.parser.truncate,
            truncate_threshold: self.parser.truncate_threshold.max(1),
            notification_marker: self.notifications.marker.clone(),
        };
        Ok(LineParser::new(self.level_patterns()?, options))
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            marker: self.notifications.marker.clone(),
            group_rules: self
                .notifications
                .groups
                .iter()
                .map(|g| GroupRule {
                    id: g.id.clone(),
                    name: g.name.clone(),
                    keywords: g.keywords.clone(),
                    also: g.also.clone(),
                })
                .collect(),
            ..ExtractorConfig::default()
        }
    }

    /// Initial filter: every level shown, no search text.
    pub fn filter_config(&self) -> Result<FilterConfig, ConfigError> {
        FilterConfig::new(
            LevelSet::all(),
            None,
            self.filter.collapse_repeats,
            self.filter.collapse_threshold,
        )
    }
}
