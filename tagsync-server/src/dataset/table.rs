//! Raw CSV table: a header row plus string cells

use super::{DatasetError, DatasetResult};
use std::io::Read;
use std::path::Path;

/// A loaded CSV table with every cell kept as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a CSV file with a header row
    pub fn read_csv(path: &Path) -> DatasetResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| DatasetError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file).map_err(|e| match e {
            DatasetError::Csv(reason) => DatasetError::Read {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> DatasetResult<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| DatasetError::Csv(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DatasetError::Csv(e.to_string()))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Serialize back to CSV bytes
    pub fn to_csv(&self) -> DatasetResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| DatasetError::Csv(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| DatasetError::Csv(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| DatasetError::Csv(e.to_string()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of the first column whose trimmed name equals `name`
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// First column matching any of `names`, tried in order
    pub fn column_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.column(name))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(|c| c.as_str())
    }

    /// Every cell of one column, in row order
    pub fn column_values(&self, column: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|r| r.get(column).map(|c| c.as_str()).unwrap_or(""))
            .collect()
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: &str) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            value.clone_into(cell);
        }
    }
}
