//! Schema resolution: which columns are labels and what their tags are called
//!
//! Precedence:
//! 1. Every data column named `tag_code_<N>` is a label column for code `N`,
//!    in column order.
//! 2. Otherwise a `tag_code` column supplies one code (from row 0) and the
//!    `label` column holds its boolean.
//! 3. Neither scheme present: the dataset is unusable.
//!
//! Aliases come from the metadata table by exact code match, first match
//! wins. A code without a metadata row gets the alias `<code>_fallback`.

use super::{DatasetError, DatasetResult, Table};
use tracing::{info, warn};

pub const TAG_COLUMN_PREFIX: &str = "tag_code_";
pub const SINGLE_CODE_COLUMN: &str = "tag_code";
pub const SINGLE_LABEL_COLUMN: &str = "label";
pub const FILE_PATH_COLUMN: &str = "file_path";

const META_CODE_COLUMNS: &[&str] = &["code", "tag_code"];
const META_ALIAS_COLUMNS: &[&str] = &["alias", "scenario"];

/// How label columns were found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
    /// One `tag_code_<N>` column per tag
    PerTagColumns,
    /// A single `tag_code` + `label` pair
    SingleLabel,
}

/// Label columns in column order, each with its tag code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLabels {
    pub scheme: LabelScheme,
    /// `(code, column index)` pairs
    pub columns: Vec<(i64, usize)>,
}

/// Find the label columns of the data table
pub fn resolve_label_columns(data: &Table) -> DatasetResult<ResolvedLabels> {
    let mut columns = Vec::new();
    for (idx, header) in data.headers().iter().enumerate() {
        let Some(suffix) = header.trim().strip_prefix(TAG_COLUMN_PREFIX) else {
            continue;
        };
        match parse_code(suffix) {
            Some(code) => {
                info!("Found {} at column {} with code {}", header.trim(), idx, code);
                columns.push((code, idx));
            }
            None => warn!(
                "Column '{}' has a non-numeric tag code, not treated as a label",
                header.trim()
            ),
        }
    }
    if !columns.is_empty() {
        return Ok(ResolvedLabels {
            scheme: LabelScheme::PerTagColumns,
            columns,
        });
    }

    info!(
        "No '{}*' columns, trying '{}' + '{}'",
        TAG_COLUMN_PREFIX, SINGLE_CODE_COLUMN, SINGLE_LABEL_COLUMN
    );
    let (Some(code_col), Some(label_col)) = (
        data.column(SINGLE_CODE_COLUMN),
        data.column(SINGLE_LABEL_COLUMN),
    ) else {
        return Err(DatasetError::NoLabelColumns);
    };

    let raw = data.cell(0, code_col).ok_or(DatasetError::NoRows)?;
    let code = parse_code(raw).ok_or_else(|| DatasetError::InvalidTagCode {
        column: SINGLE_CODE_COLUMN.to_string(),
        value: raw.to_string(),
    })?;

    Ok(ResolvedLabels {
        scheme: LabelScheme::SingleLabel,
        columns: vec![(code, label_col)],
    })
}

/// Look up the alias of every code in the metadata table
pub fn resolve_aliases(codes: &[i64], meta: &Table) -> Vec<String> {
    let code_col = meta.column_any(META_CODE_COLUMNS);
    let alias_col = meta.column_any(META_ALIAS_COLUMNS);
    if code_col.is_none() {
        warn!("Meta table has no 'code' column");
    }
    if alias_col.is_none() {
        warn!("Meta table has no 'alias' column");
    }

    codes
        .iter()
        .map(|&code| {
            let found = code_col.zip(alias_col).and_then(|(code_col, alias_col)| {
                (0..meta.row_count()).find_map(|row| {
                    let cell = meta.cell(row, code_col)?;
                    (parse_code(cell) == Some(code))
                        .then(|| meta.cell(row, alias_col).unwrap_or("").to_string())
                })
            });
            match found {
                Some(alias) => {
                    info!("Found alias '{}' for tag code {}", alias, code);
                    alias
                }
                None => {
                    let alias = format!("{}_fallback", code);
                    warn!("No alias found for tag code {}, using {}", code, alias);
                    alias
                }
            }
        })
        .collect()
}

/// Parse an integer tag code, accepting integral floats like `17.0`
pub fn parse_code(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(code) = raw.parse::<i64>() {
        return Some(code);
    }
    let value = raw.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_per_tag_columns_in_column_order() {
        let data = table("file_path,tag_code_17,clip_id,tag_code_3\na.png,False,1,True\n");
        let resolved = resolve_label_columns(&data).unwrap();
        assert_eq!(resolved.scheme, LabelScheme::PerTagColumns);
        assert_eq!(resolved.columns, vec![(17, 1), (3, 3)]);
    }

    #[test]
    fn test_single_label_fallback() {
        let data = table("file_path,tag_code,label\na.png,42,False\nb.png,42,True\n");
        let resolved = resolve_label_columns(&data).unwrap();
        assert_eq!(resolved.scheme, LabelScheme::SingleLabel);
        assert_eq!(resolved.columns, vec![(42, 2)]);
    }

    #[test]
    fn test_no_label_scheme_is_fatal() {
        let data = table("file_path,tag_code\na.png,42\n");
        assert!(matches!(
            resolve_label_columns(&data),
            Err(DatasetError::NoLabelColumns)
        ));
    }

    #[test]
    fn test_single_label_needs_a_row() {
        let data = table("file_path,tag_code,label\n");
        assert!(matches!(
            resolve_label_columns(&data),
            Err(DatasetError::NoRows)
        ));
    }

    #[test]
    fn test_non_numeric_suffix_skipped() {
        let data = table("tag_code_x,tag_code_5\nTrue,False\n");
        let resolved = resolve_label_columns(&data).unwrap();
        assert_eq!(resolved.columns, vec![(5, 1)]);
    }

    #[test]
    fn test_missing_alias_falls_back() {
        let meta = table("code,alias\n3,walking\n");
        let aliases = resolve_aliases(&[3, 17], &meta);
        assert_eq!(aliases, vec!["walking".to_string(), "17_fallback".to_string()]);
    }

    #[test]
    fn test_first_alias_match_wins() {
        let meta = table("tag_code,scenario\n5.0,first\n5,second\n");
        assert_eq!(resolve_aliases(&[5], &meta), vec!["first".to_string()]);
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code(" 17 "), Some(17));
        assert_eq!(parse_code("17.0"), Some(17));
        assert_eq!(parse_code("17.5"), None);
        assert_eq!(parse_code("abc"), None);
    }
}
