//! Image delivery: read the file behind a row's `file_path`
//!
//! The bytes are returned whole; chunking happens in the frame writer.

use crate::dataset::DatasetIndex;
use std::path::{Path, PathBuf};
use tagsync_common::protocol::Response;
use thiserror::Error;
use tracing::{debug, warn};

/// Why an image could not be delivered
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Row index past `data_cnt`; no response is sent for these
    #[error("Row {row} out of range ({data_cnt} rows)")]
    OutOfRange { row: u32, data_cnt: usize },

    /// No `file_path` column, or an empty cell
    #[error("Row {row} has no file path")]
    NoFilePath { row: u32 },

    /// File could not be opened or read
    #[error("Cannot read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

impl DeliveryError {
    /// Wire response for this failure, `None` when nothing should be sent
    pub fn into_response(self, row: u32) -> Option<Response> {
        match self {
            DeliveryError::OutOfRange { .. } => None,
            other => Some(Response::ImageError {
                row,
                message: other.to_string(),
            }),
        }
    }
}

/// Resolve a row's file path, joining relative paths onto `image_root`
pub fn resolve_path(index: &DatasetIndex, image_root: Option<&Path>, row: u32) -> Result<PathBuf, DeliveryError> {
    if row as usize >= index.data_cnt() {
        return Err(DeliveryError::OutOfRange {
            row,
            data_cnt: index.data_cnt(),
        });
    }
    let raw = index
        .file_path(row as usize)
        .ok_or(DeliveryError::NoFilePath { row })?;

    let path = PathBuf::from(raw);
    Ok(match image_root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path,
    })
}

/// Read the image bytes of `row`
pub async fn deliver(index: &DatasetIndex, image_root: Option<&Path>, row: u32) -> Result<Vec<u8>, DeliveryError> {
    let path = resolve_path(index, image_root, row)?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Row {}: {} bytes from {}", row, bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) => {
            warn!("Row {}: cannot read {}: {}", row, path.display(), e);
            Err(DeliveryError::Read {
                path,
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnConfig;
    use crate::dataset::Table;
    use tempfile::TempDir;

    fn index(csv: &str) -> DatasetIndex {
        let data = Table::from_reader(csv.as_bytes()).unwrap();
        let meta = Table::from_reader("code,alias\n1,one\n".as_bytes()).unwrap();
        DatasetIndex::build(&data, &meta, &ColumnConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.path().join("a.png"), &bytes).unwrap();

        let index = index("file_path,tag_code_1\na.png,False\n");
        let got = deliver(&index, Some(dir.path()), 0).await.unwrap();
        assert_eq!(got, bytes);
    }

    #[tokio::test]
    async fn test_out_of_range_sends_nothing() {
        let index = index("file_path,tag_code_1\na.png,False\n");
        let err = deliver(&index, None, 1).await.unwrap_err();
        assert!(matches!(err, DeliveryError::OutOfRange { row: 1, .. }));
        assert!(err.into_response(1).is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_error_response() {
        let dir = TempDir::new().unwrap();
        let index = index("file_path,tag_code_1\nmissing.png,False\n");

        let err = deliver(&index, Some(dir.path()), 0).await.unwrap_err();
        match err.into_response(0) {
            Some(Response::ImageError { row, message }) => {
                assert_eq!(row, 0);
                assert!(message.contains("missing.png"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_path_cell() {
        let index = index("file_path,tag_code_1\n,False\n");
        let err = deliver(&index, None, 0).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NoFilePath { row: 0 }));
    }
}
