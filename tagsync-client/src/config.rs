//! tagsync-client configuration
//!
//! Resolution order for the file: `--config` flag, then `tagsync-client.toml`
//! in the working directory, then `<config_dir>/tagsync/client.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagsync_common::config::{user_config_path, LoggingConfig};
use tagsync_common::protocol::DEFAULT_READ_TIMEOUT;

pub const DEFAULT_CONFIG_FILE: &str = "tagsync-client.toml";

/// Client configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Toggle tags independently instead of one tag per row
    pub multiple_selection: bool,

    /// Send a save request after every Nth submitted mutation, 0 disables
    pub autosave_interval: u32,

    pub connect_timeout_secs: u64,

    /// Stall bound for fixed-size socket reads
    pub read_timeout_secs: u64,

    /// Re-request cadence while bootstrap data is missing
    pub bootstrap_retry_ms: u64,

    /// Bootstrap rounds before giving up
    pub bootstrap_attempts: u32,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 52973,
            multiple_selection: false,
            autosave_interval: 1,
            connect_timeout_secs: 3,
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            bootstrap_retry_ms: 500,
            bootstrap_attempts: 20,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `path`, writing defaults there if the file is missing
    pub fn load(path: &Path) -> tagsync_common::Result<Self> {
        tagsync_common::config::load_or_init(path)
    }

    /// Pick the config file to use
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }
        user_config_path("client.toml").unwrap_or(local)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms.max(10))
    }
}
