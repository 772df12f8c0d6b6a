//! Label cell format and the projected row table
//!
//! The projected row table is CSV text holding only the label columns: one
//! header row with the label column names, then one row per data row. Cells
//! are written as `True`/`False` and read leniently.

use crate::{Error, Result};

/// Parse a label cell, returning `None` for anything that is not a boolean
pub fn parse_label(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "0.0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

pub fn format_label(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Label rows decoded from a projected row table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<bool>>,
    /// Cells that were not booleans and were read as `false`
    pub unparsed_cells: usize,
}

impl Projection {
    pub fn data_cnt(&self) -> usize {
        self.rows.len()
    }
}

/// Render label rows as CSV text
pub fn encode_projection<'a, I>(columns: &[String], rows: I) -> Result<String>
where
    I: IntoIterator<Item = &'a [bool]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record(row.iter().map(|v| format_label(*v)))
            .map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV buffer: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(e.to_string()))
}

/// Parse CSV text produced by [`encode_projection`]
pub fn decode_projection(text: &str) -> Result<Projection> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut projection = Projection {
        columns,
        ..Default::default()
    };
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row = record
            .iter()
            .map(|cell| {
                parse_label(cell).unwrap_or_else(|| {
                    projection.unparsed_cells += 1;
                    false
                })
            })
            .collect();
        projection.rows.push(row);
    }
    Ok(projection)
}

fn csv_error(e: csv::Error) -> Error {
    Error::InvalidInput(format!("CSV error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_variants() {
        assert_eq!(parse_label("True"), Some(true));
        assert_eq!(parse_label(" 1 "), Some(true));
        assert_eq!(parse_label("1.0"), Some(true));
        assert_eq!(parse_label("FALSE"), Some(false));
        assert_eq!(parse_label("0"), Some(false));
        assert_eq!(parse_label(""), None);
        assert_eq!(parse_label("maybe"), None);
    }

    #[test]
    fn test_projection_text() {
        let columns = vec!["tag_code_1".to_string(), "tag_code_7".to_string()];
        let rows = [vec![true, false], vec![false, false]];

        let text = encode_projection(&columns, rows.iter().map(|r| r.as_slice())).unwrap();
        assert_eq!(text, "tag_code_1,tag_code_7\nTrue,False\nFalse,False\n");

        let decoded = decode_projection(&text).unwrap();
        assert_eq!(decoded.columns, columns);
        assert_eq!(decoded.rows, rows.to_vec());
        assert_eq!(decoded.unparsed_cells, 0);
    }

    #[test]
    fn test_unparsed_cells_read_false() {
        let decoded = decode_projection("label\nTrue\nnan\n").unwrap();
        assert_eq!(decoded.rows, vec![vec![true], vec![false]]);
        assert_eq!(decoded.unparsed_cells, 1);
    }
}
