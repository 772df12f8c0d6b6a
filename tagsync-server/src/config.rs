//! tagsync-server configuration
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! built-in default. Command-line flags override `host` and `port`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagsync_common::config::LoggingConfig;
use tagsync_common::protocol::DEFAULT_READ_TIMEOUT;

/// Default listening port
pub const DEFAULT_PORT: u16 = 52973;

/// Server configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Data table (one row per image)
    pub data_path: PathBuf,

    /// Tag-metadata table (`code`, `alias`, ...)
    pub meta_path: PathBuf,

    /// Directory receiving `<data_stem>__labelled__.csv`
    pub save_dir: PathBuf,

    /// Persist over `data_path` instead of writing into `save_dir`
    pub save_to_same_file: bool,

    /// Base directory for relative `file_path` values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_root: Option<PathBuf>,

    /// Stall bound for fixed-size socket reads
    pub read_timeout_secs: u64,

    /// Column names used for clip segmentation
    pub columns: ColumnConfig,

    pub logging: LoggingConfig,
}

/// Names of the optional grouping and view columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnConfig {
    /// Grouping key; consecutive rows with the same value form a clip
    pub clip: String,
    /// View key (camera/modality) distinguishing synchronized captures
    pub view: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            clip: "clip_id".to_string(),
            view: "modality".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_path: PathBuf::from("data/data.csv"),
            meta_path: PathBuf::from("meta.csv"),
            save_dir: PathBuf::from("data"),
            save_to_same_file: false,
            image_root: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            columns: ColumnConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`, writing defaults there if the file is missing
    pub fn load(path: &Path) -> tagsync_common::Result<Self> {
        tagsync_common::config::load_or_init(path)
    }

    /// Address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    /// Where `persist` writes the labelled table
    pub fn output_path(&self) -> PathBuf {
        if self.save_to_same_file {
            return self.data_path.clone();
        }
        let stem = self
            .data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        self.save_dir.join(format!("{}__labelled__.csv", stem))
    }
}
