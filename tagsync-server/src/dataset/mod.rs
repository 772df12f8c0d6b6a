//! Dataset index
//!
//! Built once at startup from the data table and the tag-metadata table and
//! read-only afterwards, so sessions share it without locking. The mutable
//! label values live in [`crate::store::TagStore`].

mod schema;
mod table;

pub use schema::{
    parse_code, resolve_aliases, resolve_label_columns, LabelScheme, ResolvedLabels,
    FILE_PATH_COLUMN, SINGLE_CODE_COLUMN, SINGLE_LABEL_COLUMN, TAG_COLUMN_PREFIX,
};
pub use table::Table;

use crate::config::ColumnConfig;
use std::path::PathBuf;
use tagsync_common::layout::{segment_clips, verify_contiguous, Clip};
use thiserror::Error;
use tracing::{info, warn};

/// Result type for dataset loading
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

/// Errors that make a dataset unusable
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Table file could not be opened or parsed
    #[error("Cannot read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// Malformed CSV content
    #[error("CSV error: {0}")]
    Csv(String),

    /// Neither `tag_code_<N>` columns nor the `tag_code` + `label` pair exist
    #[error("No column matching 'tag_code_*' or 'tag_code' + 'label' found")]
    NoLabelColumns,

    /// Single-label scheme needs row 0 to read the tag code
    #[error("Data table has no rows to read 'tag_code' from")]
    NoRows,

    /// Tag code cell is not an integer
    #[error("Invalid tag code '{value}' in column '{column}'")]
    InvalidTagCode { column: String, value: String },
}

/// One mutable label column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelColumn {
    pub code: i64,
    pub alias: String,
    /// Index in the data table
    pub column: usize,
    /// Header of that column
    pub name: String,
}

/// Resolved schema, file paths and clip layout of a dataset
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    scheme: LabelScheme,
    label_columns: Vec<LabelColumn>,
    file_path_column: Option<usize>,
    non_label_columns: Vec<String>,
    file_paths: Vec<String>,
    clips: Vec<Clip>,
    data_cnt: usize,
}

impl DatasetIndex {
    pub fn build(data: &Table, meta: &Table, columns: &ColumnConfig) -> DatasetResult<Self> {
        let resolved = resolve_label_columns(data)?;
        let codes: Vec<i64> = resolved.columns.iter().map(|(code, _)| *code).collect();
        let aliases = resolve_aliases(&codes, meta);

        let label_columns: Vec<LabelColumn> = resolved
            .columns
            .iter()
            .zip(aliases)
            .map(|(&(code, column), alias)| LabelColumn {
                code,
                alias,
                column,
                name: data.headers()[column].clone(),
            })
            .collect();
        info!(
            "Resolved {} label columns: {:?}",
            label_columns.len(),
            label_columns.iter().map(|l| &l.alias).collect::<Vec<_>>()
        );

        let non_label_columns = data
            .headers()
            .iter()
            .enumerate()
            .filter(|(idx, _)| !label_columns.iter().any(|l| l.column == *idx))
            .map(|(_, h)| h.clone())
            .collect();

        let file_path_column = data.column(FILE_PATH_COLUMN);
        let file_paths = match file_path_column {
            Some(col) => {
                info!("Data table has '{}' at column {}", FILE_PATH_COLUMN, col);
                data.column_values(col).into_iter().map(str::to_string).collect()
            }
            None => {
                warn!(
                    "Data table has no '{}' column, image requests will fail",
                    FILE_PATH_COLUMN
                );
                Vec::new()
            }
        };

        let data_cnt = data.row_count();
        let clips = segment(data, columns);

        Ok(Self {
            scheme: resolved.scheme,
            label_columns,
            file_path_column,
            non_label_columns,
            file_paths,
            clips,
            data_cnt,
        })
    }

    pub fn scheme(&self) -> LabelScheme {
        self.scheme
    }

    pub fn tag_cnt(&self) -> usize {
        self.label_columns.len()
    }

    pub fn data_cnt(&self) -> usize {
        self.data_cnt
    }

    pub fn label_columns(&self) -> &[LabelColumn] {
        &self.label_columns
    }

    /// Alias of every label column, in column order
    pub fn aliases(&self) -> Vec<String> {
        self.label_columns.iter().map(|l| l.alias.clone()).collect()
    }

    pub fn file_path_column(&self) -> Option<usize> {
        self.file_path_column
    }

    /// File path of a row, `None` when the column is missing or the cell is empty
    pub fn file_path(&self, row: usize) -> Option<&str> {
        self.file_paths
            .get(row)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
    }

    /// Columns excluded from the projected row table
    pub fn non_label_columns(&self) -> &[String] {
        &self.non_label_columns
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }
}

fn segment(data: &Table, columns: &ColumnConfig) -> Vec<Clip> {
    let Some(clip_col) = data.column(&columns.clip) else {
        warn!("No '{}' column, using a single clip", columns.clip);
        return segment_clips::<&str, &str>(data.row_count(), None, None);
    };
    info!("'{}' is at column {}", columns.clip, clip_col);

    let keys = data.column_values(clip_col);
    let view_col = data.column(&columns.view);
    match view_col {
        Some(col) => info!("Found '{}' at column {}", columns.view, col),
        None => warn!(
            "'{}' not found, multi-view grouping not available",
            columns.view
        ),
    }
    let views = view_col.map(|col| data.column_values(col));

    let clips = segment_clips(data.row_count(), Some(keys.as_slice()), views.as_deref());
    verify_contiguous(&clips);
    info!("{} clips stored", clips.len());
    clips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_build_index_with_clips() {
        let data = table(
            "file_path,clip_id,modality,tag_code_1,tag_code_2\n\
             a.png,A,c1,False,False\n\
             b.png,A,c2,False,False\n\
             c.png,A,c1,False,False\n\
             d.png,B,c1,True,False\n\
             e.png,B,c2,False,True\n",
        );
        let meta = table("code,alias\n1,stand\n2,sit\n");

        let index = DatasetIndex::build(&data, &meta, &ColumnConfig::default()).unwrap();
        assert_eq!(index.tag_cnt(), 2);
        assert_eq!(index.data_cnt(), 5);
        assert_eq!(index.aliases(), vec!["stand", "sit"]);
        assert_eq!(index.non_label_columns(), &["file_path", "clip_id", "modality"]);
        assert_eq!(index.file_path(3), Some("d.png"));
        assert_eq!(index.clips(), &[Clip::new(0, 3, 1), Clip::new(3, 5, 2)]);
    }

    #[test]
    fn test_unknown_code_gets_fallback_alias() {
        let data = table("file_path,tag_code_17\na.png,False\n");
        let meta = table("code,alias\n3,other\n");

        let index = DatasetIndex::build(&data, &meta, &ColumnConfig::default()).unwrap();
        assert_eq!(index.aliases(), vec!["17_fallback"]);
    }

    #[test]
    fn test_missing_file_path_is_not_fatal() {
        let data = table("path,tag_code_1\na.png,False\n");
        let meta = table("code,alias\n1,one\n");

        let index = DatasetIndex::build(&data, &meta, &ColumnConfig::default()).unwrap();
        assert_eq!(index.file_path_column(), None);
        assert_eq!(index.file_path(0), None);
        // No grouping column: one clip over every row
        assert_eq!(index.clips(), &[Clip::new(0, 1, 1)]);
    }

    #[test]
    fn test_custom_column_names() {
        let data = table(
            "file_path,session,camera,tag_code_1\n\
             a.png,s1,left,False\n\
             b.png,s1,right,False\n",
        );
        let meta = table("code,alias\n1,one\n");
        let columns = ColumnConfig {
            clip: "session".to_string(),
            view: "camera".to_string(),
        };

        let index = DatasetIndex::build(&data, &meta, &columns).unwrap();
        assert_eq!(index.clips(), &[Clip::new(0, 2, 2)]);
    }
}
