//! Tag state store: the authoritative label matrix
//!
//! Holds the full data table plus a dense `data_cnt x tag_cnt` boolean matrix.
//! `set_range` is a plain range write; single-select discipline is the
//! client's business. The server wraps the store in a mutex (see
//! [`crate::ServerContext`]) so concurrent sessions never interleave writes.

use crate::dataset::Table;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tagsync_common::labels::{encode_projection, format_label, parse_label};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-request store failures; none of them change the matrix
#[derive(Error, Debug)]
pub enum StoreError {
    /// Row index past the end of the table
    #[error("Row range [{begin}, {end}] out of bounds for {data_cnt} rows")]
    OutOfRange { begin: u32, end: u32, data_cnt: usize },

    /// `begin` after `end`
    #[error("Invalid row range [{begin}, {end}]")]
    InvalidRange { begin: u32, end: u32 },

    /// Label vector length differs from the number of label columns
    #[error("Expected {expected} tag values, got {got}")]
    TagCountMismatch { expected: usize, got: usize },

    /// Output location cannot be written
    #[error("Cannot write {path}: {reason}")]
    NotWritable { path: PathBuf, reason: String },

    /// Serialization or file write failed
    #[error("Persist failed: {0}")]
    Persist(String),
}

/// Mutable label matrix plus the table it is persisted with
#[derive(Debug)]
pub struct TagStore {
    table: Table,
    label_columns: Vec<usize>,
    label_names: Vec<String>,
    matrix: Vec<bool>,
    output_path: PathBuf,
}

impl TagStore {
    /// Take ownership of the table and parse its label cells
    pub fn new(table: Table, label_columns: Vec<usize>, output_path: PathBuf) -> Self {
        let tag_cnt = label_columns.len();
        let mut matrix = Vec::with_capacity(table.row_count() * tag_cnt);
        let mut unparsed = 0usize;
        for row in 0..table.row_count() {
            for &col in &label_columns {
                let cell = table.cell(row, col).unwrap_or("");
                matrix.push(parse_label(cell).unwrap_or_else(|| {
                    unparsed += 1;
                    false
                }));
            }
        }
        if unparsed > 0 {
            warn!("{} label cells were not booleans, read as False", unparsed);
        }

        let label_names = label_columns
            .iter()
            .map(|&c| table.headers()[c].clone())
            .collect();

        Self {
            table,
            label_columns,
            label_names,
            matrix,
            output_path,
        }
    }

    pub fn data_cnt(&self) -> usize {
        self.table.row_count()
    }

    pub fn tag_cnt(&self) -> usize {
        self.label_columns.len()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Label vector of one row
    pub fn get(&self, row: u32) -> StoreResult<Vec<bool>> {
        let row = row as usize;
        if row >= self.data_cnt() {
            return Err(StoreError::OutOfRange {
                begin: row as u32,
                end: row as u32,
                data_cnt: self.data_cnt(),
            });
        }
        Ok(self.row_slice(row).to_vec())
    }

    /// Apply `values` to every row in `[begin, end]`
    pub fn set_range(&mut self, begin: u32, end: u32, values: &[bool]) -> StoreResult<()> {
        if end as usize >= self.data_cnt() {
            return Err(StoreError::OutOfRange {
                begin,
                end,
                data_cnt: self.data_cnt(),
            });
        }
        if begin > end {
            return Err(StoreError::InvalidRange { begin, end });
        }
        if values.len() != self.tag_cnt() {
            return Err(StoreError::TagCountMismatch {
                expected: self.tag_cnt(),
                got: values.len(),
            });
        }

        let tag_cnt = self.tag_cnt();
        for row in begin as usize..=end as usize {
            self.matrix[row * tag_cnt..(row + 1) * tag_cnt].copy_from_slice(values);
        }
        info!("Rows [{}, {}] set to {:?}", begin, end, values);
        Ok(())
    }

    /// CSV text of the label columns as they are now
    pub fn render_projection(&self) -> StoreResult<String> {
        let rows = (0..self.data_cnt()).map(|row| self.row_slice(row));
        encode_projection(&self.label_names, rows).map_err(|e| StoreError::Persist(e.to_string()))
    }

    /// Write the full table, with current labels, to the output path
    ///
    /// Writability is checked again on every call. On failure the in-memory
    /// matrix is kept and the previous output file is left as it was.
    pub fn persist(&self) -> StoreResult<PathBuf> {
        self.snapshot().write()
    }

    /// Copy of the table with the current labels written into it
    pub fn snapshot(&self) -> Snapshot {
        let mut table = self.table.clone();
        for row in 0..self.data_cnt() {
            for (tag, &col) in self.label_columns.iter().enumerate() {
                table.set_cell(row, col, format_label(self.row_slice(row)[tag]));
            }
        }
        Snapshot {
            table,
            path: self.output_path.clone(),
        }
    }

    fn row_slice(&self, row: usize) -> &[bool] {
        let tag_cnt = self.tag_cnt();
        &self.matrix[row * tag_cnt..(row + 1) * tag_cnt]
    }
}

/// Table contents frozen for one save
///
/// Detached from the store so the file I/O can run off the async runtime.
#[derive(Debug)]
pub struct Snapshot {
    table: Table,
    path: PathBuf,
}

impl Snapshot {
    /// Blocking: re-check the target, then replace it atomically
    pub fn write(self) -> StoreResult<PathBuf> {
        check_writable(&self.path)?;
        let bytes = self
            .table
            .to_csv()
            .map_err(|e| StoreError::Persist(e.to_string()))?;
        tagsync_common::config::write_atomic(&self.path, &bytes)
            .map_err(|e| StoreError::Persist(e.to_string()))?;
        info!("File saved to {}", self.path.display());
        Ok(self.path)
    }
}

/// Make sure `path` can be written, creating its directory if needed
///
/// Fails when the directory cannot be created or written, when `path` is a
/// directory, or when an existing file at `path` is not writable.
pub fn check_writable(path: &Path) -> StoreResult<()> {
    let not_writable = |reason: String| StoreError::NotWritable {
        path: path.to_path_buf(),
        reason,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !dir.exists() {
        warn!("{} does not exist, creating", dir.display());
        std::fs::create_dir_all(&dir)
            .map_err(|e| not_writable(format!("cannot create {}: {}", dir.display(), e)))?;
    } else if !dir.is_dir() {
        return Err(not_writable(format!("{} is not a directory", dir.display())));
    }

    // Write into the directory itself; permission bits alone miss ACLs and read-only mounts
    let marker = dir.join(".tagsync-write-check");
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)
        .map_err(|e| not_writable(format!("{} is not writable: {}", dir.display(), e)))?;
    if let Err(e) = std::fs::remove_file(&marker) {
        debug!("Cannot remove {}: {}", marker.display(), e);
    }

    if path.exists() {
        if path.is_dir() {
            return Err(not_writable("target is a directory".to_string()));
        }
        OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| not_writable(format!("permission denied: {}", e)))?;
    }
    Ok(())
}
