//! Configuration file loading and atomic writes
//!
//! Both binaries keep their settings in a small TOML file. A missing file is not
//! fatal: the defaults are written to the requested path so the operator has a
//! template to edit, and startup continues with those defaults. A file that
//! exists but does not parse is a startup error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-user configuration path: `<config_dir>/tagsync/<file_name>`
pub fn user_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tagsync").join(file_name))
}

/// Load a TOML config file, writing defaults when the file does not exist
pub fn load_or_init<T>(path: &Path) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Invalid TOML in {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            let config = T::default();
            match write_toml_config(&config, path) {
                Ok(()) => info!("Default config written to {}", path.display()),
                Err(e) => warn!("Could not write default config: {}", e),
            }
            Ok(config)
        }
        Err(e) => Err(Error::Config(format!(
            "Cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Serialize a config to TOML and write it atomically
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    write_atomic(path, content.as_bytes())
}

/// Write `bytes` to a `.tmp` sibling of `path`, then rename it over `path`
///
/// Readers never observe a half-written file, and a failed write leaves the
/// previous contents of `path` in place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_sibling(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Default)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.toml");

        let loaded: Sample = load_or_init(&path).unwrap();
        assert_eq!(loaded, Sample::default());
        assert!(path.exists());

        // Second load reads the file that was just written
        let reloaded: Sample = load_or_init(&path).unwrap();
        assert_eq!(reloaded.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "name = [unterminated").unwrap();

        let result: Result<Sample> = load_or_init(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_write_atomic_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        write_atomic(&path, b"a,b\n1,2\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a,b\n1,2\n");
        assert!(!dir.path().join("nested").join("out.csv.tmp").exists());
    }
}
