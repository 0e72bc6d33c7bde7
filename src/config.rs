use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use crate::actors::scheduler::SchedulerOptions;
use crate::browser::LaunchOptions;
use crate::model::{Page, Site};
use crate::monitors::ExecutorOptions;

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (runs older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitoring.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sites: Vec<SiteEntry>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub events: EventsConfig,
}

/// A monitored site as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub frequency_seconds: Option<u64>,
    #[serde(default)]
    pub alert_recipients: Vec<String>,
    #[serde(default)]
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl From<SiteEntry> for Site {
    fn from(entry: SiteEntry) -> Self {
        Site {
            id: entry.id,
            name: entry.name,
            base_url: entry.base_url,
            enabled: entry.enabled,
            frequency_seconds: entry.frequency_seconds,
            alert_recipients: entry.alert_recipients,
            pages: entry
                .pages
                .into_iter()
                .map(|page| Page {
                    id: page.id,
                    name: page.name,
                    path: page.path,
                    enabled: page.enabled,
                })
                .collect(),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_frequency_secs")]
    pub default_frequency_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            default_frequency_secs: default_frequency_secs(),
        }
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        SchedulerOptions {
            tick: Duration::from_secs(config.tick_secs.max(1)),
            default_frequency_secs: config.default_frequency_secs,
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_frequency_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Capacity of the trigger channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_max_concurrent_runs() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "enabled_by_default")]
    pub headless: bool,
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            headless: true,
            user_agent: None,
        }
    }
}

impl From<&BrowserConfig> for ExecutorOptions {
    fn from(config: &BrowserConfig) -> Self {
        ExecutorOptions {
            launch: LaunchOptions {
                headless: config.headless,
                viewport_width: config.viewport_width,
                viewport_height: config.viewport_height,
                user_agent: config.user_agent.clone(),
            },
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
        }
    }
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

/// `api` section of the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub token: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
            enable_cors: true,
        }
    }
}

fn default_bind() -> String {
    String::from("127.0.0.1:8080")
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Live subscribers receiving nothing for this long are disconnected
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl EventsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
}
