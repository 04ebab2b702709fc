//! Tabular I/O
//!
//! Reads CSV tables into raw string records, selects typed numeric frames out
//! of them, and writes frames and serializable records back out as CSV.

use crate::error::SliError;
use crate::types::{Column, Frame, KeyColumn};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// CSV table as read from disk, before any column is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Name used in error messages (usually the source path)
    pub name: String,
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse a CSV table with a header row
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self, SliError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            records,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, SliError> {
        let file = File::open(path)?;
        Self::from_reader(&path.display().to_string(), file)
    }

    pub fn n_rows(&self) -> usize {
        self.records.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Build a numeric frame from the named columns.
    ///
    /// Every column in `columns` must exist and hold finite numbers. The key
    /// column is attached only when present in the table.
    pub fn select(&self, columns: &[&str], key: Option<&str>) -> Result<Frame, SliError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SliError::Schema {
                table: self.name.clone(),
                missing,
            });
        }

        let mut selected = Vec::with_capacity(columns.len());
        for name in columns {
            let idx = self.column_index(name).unwrap_or_default();
            let values = self
                .records
                .iter()
                .enumerate()
                .map(|(row, record)| parse_cell(name, row + 1, record.get(idx)))
                .collect::<Result<Vec<_>, _>>()?;
            selected.push(Column::new(*name, values));
        }

        let key = key
            .and_then(|name| self.column_index(name).map(|idx| (name, idx)))
            .map(|(name, idx)| KeyColumn {
                name: name.to_string(),
                values: self
                    .records
                    .iter()
                    .map(|r| r.get(idx).cloned().unwrap_or_default())
                    .collect(),
            });

        Ok(Frame::new(key, selected))
    }
}

fn parse_cell(column: &str, row: usize, cell: Option<&String>) -> Result<f64, SliError> {
    let text = cell.map(String::as_str).unwrap_or("");
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SliError::NonNumeric {
            column: column.to_string(),
            row,
            value: text.to_string(),
        }),
    }
}

/// Write a frame as CSV, key column first
pub fn write_frame<W: Write>(writer: W, frame: &Frame) -> Result<(), SliError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = Vec::with_capacity(frame.columns.len() + 1);
    if let Some(key) = &frame.key {
        header.push(&key.name);
    }
    header.extend(frame.column_names());
    wtr.write_record(&header)?;

    for row in 0..frame.n_rows() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if let Some(key) = &frame.key {
            record.push(key.values[row].clone());
        }
        record.extend(frame.columns.iter().map(|c| c.values[row].to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write serializable rows as CSV, header derived from field names
pub fn write_records<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<(), SliError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_frame_to_path(path: &Path, frame: &Frame) -> Result<(), SliError> {
    write_frame(File::create(path)?, frame)
}


/// Render a frame to a CSV string
pub fn frame_to_csv(frame: &Frame) -> Result<String, SliError> {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, frame)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Render serializable rows to a CSV string
pub fn records_to_csv<T: Serialize>(rows: &[T]) -> Result<String, SliError> {
    let mut buffer = Vec::new();
    write_records(&mut buffer, rows)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCORES_CSV: &str = "unit_id,HA_score,ER_score,PO_score,SLI_simple,note\n\
                              u1,0.1,0.2,0.3,0.2,ok\n\
                              u2, 0.4 ,0.5,0.6,0.5,check\n";

    fn raw() -> RawTable {
        RawTable::from_reader("scores.csv", SCORES_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_read_headers_and_records() {
        let table = raw();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.headers[0], "unit_id");
        assert!(table.has_column("note"));
    }

    #[test]
    fn test_select_numeric_with_key() {
        let frame = raw()
            .select(&["HA_score", "SLI_simple"], Some("unit_id"))
            .unwrap();
        assert_eq!(frame.column("HA_score").unwrap(), &[0.1, 0.4]);
        assert_eq!(frame.key_values().unwrap(), &["u1", "u2"]);
    }

    #[test]
    fn test_select_absent_key_is_ignored() {
        let frame = raw().select(&["ER_score"], Some("site")).unwrap();
        assert!(frame.key.is_none());
    }

    #[test]
    fn test_select_missing_columns_named() {
        let err = raw().select(&["HA_score", "XX_score", "YY"], None).unwrap_err();
        match err {
            SliError::Schema { table, missing } => {
                assert_eq!(table, "scores.csv");
                assert_eq!(missing, vec!["XX_score".to_string(), "YY".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_select_non_numeric() {
        let err = raw().select(&["note"], None).unwrap_err();
        match err {
            SliError::NonNumeric { column, row, value } => {
                assert_eq!(column, "note");
                assert_eq!(row, 1);
                assert_eq!(value, "ok");
            }
            other => panic!("expected non-numeric error, got {:?}", other),
        }
    }

    #[test]
    fn test_select_rejects_nan() {
        let table = RawTable::from_reader("t", "a\n1\nNaN\n".as_bytes()).unwrap();
        assert!(matches!(
            table.select(&["a"], None),
            Err(SliError::NonNumeric { row: 2, .. })
        ));
    }

    #[test]
    fn test_ragged_rows_fail() {
        let result = RawTable::from_reader("t", "a,b\n1,2\n3\n".as_bytes());
        assert!(matches!(result, Err(SliError::Csv(_))));
    }

    #[test]
    fn test_write_frame() {
        let frame = Frame::new(
            Some(KeyColumn {
                name: "unit_id".to_string(),
                values: vec!["u1".to_string(), "u2".to_string()],
            }),
            vec![Column::new("SLI_blended", vec![0.25, 1.0])],
        );
        let csv = frame_to_csv(&frame).unwrap();
        assert_eq!(csv, "unit_id,SLI_blended\nu1,0.25\nu2,1\n");
    }

    #[test]
    fn test_write_records() {
        #[derive(Serialize)]
        struct Row {
            name: &'static str,
            value: f64,
        }

        let mut buffer = Vec::new();
        write_records(
            &mut buffer,
            &[Row {
                name: "cfi",
                value: f64::NAN,
            }],
        )
        .unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "name,value\ncfi,NaN\n");
    }
}
