//! Plugin configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::tracker::DEFAULT_MAX_ENTRIES;
use crate::metrics::http::DEFAULT_ENDPOINT;

pub const ENDPOINT_ENV: &str = "VITE_TIMING_ENDPOINT";
pub const MODE_ENV: &str = "VITE_TIMING_MODE";
pub const STALE_AFTER_ENV: &str = "VITE_TIMING_STALE_AFTER_SECS";

/// Whether the host is serving interactively or building for production.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerMode {
    #[default]
    Development,
    Production,
}

impl ServerMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "build" => ServerMode::Production,
            _ => ServerMode::Development,
        }
    }

    pub fn is_development(self) -> bool {
        self == ServerMode::Development
    }
}

#[derive(Clone, Debug)]
pub struct TimingConfig {
    /// Metrics collector URL.
    pub endpoint: String,
    pub mode: ServerMode,
    /// Paths are reported relative to this directory.
    pub project_root: PathBuf,
    /// Open cycles older than this are evicted.
    pub stale_after: Duration,
    /// How often the eviction sweep runs.
    pub sweep_interval: Duration,
    pub max_entries: usize,
    /// Path components the file watcher skips.
    pub ignored_dirs: Vec<String>,
    /// Repeat watcher events for one path inside this window count as the
    /// same save.
    pub debounce: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            mode: ServerMode::Development,
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            stale_after: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            max_entries: DEFAULT_MAX_ENTRIES,
            ignored_dirs: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "dist".to_string(),
            ],
            debounce: Duration::from_millis(50),
        }
    }
}

impl TimingConfig {
    /// Defaults overridden by the `VITE_TIMING_*` environment values.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(mode) = lookup(MODE_ENV) {
            self.mode = ServerMode::parse(&mode);
        }
        if let Some(secs) = lookup(STALE_AFTER_ENV) {
            match secs.trim().parse::<u64>() {
                Ok(secs) => self.stale_after = Duration::from_secs(secs),
                Err(e) => log::warn!(
                    "[vite-timing] Ignoring {}={:?}: {}",
                    STALE_AFTER_ENV,
                    secs,
                    e
                ),
            }
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_mode(mut self, mode: ServerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_ignored_dirs(mut self, dirs: Vec<String>) -> Self {
        self.ignored_dirs = dirs;
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn root_str(&self) -> String {
        self.project_root.to_string_lossy().into_owned()
    }
}
