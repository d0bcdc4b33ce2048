//! Per-frame hardware counter tables as produced by the counter
//! capture on the device: a header line with the counter names, then
//! one line per frame, in frame order.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use kstring::KString;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("table has no header line")]
    NoHeader,
    #[error("headers differ: {left:?} vs. {right:?}")]
    HeaderMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
    #[error("no tables given")]
    NoTables,
    #[error("tables have differing row counts: {counts:?}")]
    RowCountMismatch { counts: Vec<usize> },
    #[error("row {row} has {got} cells, but the header has {expected} columns")]
    RaggedRow {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("unterminated quoted field starting in line {line}")]
    UnterminatedQuote { line: usize },
    #[error("cell in row {row}, column {column:?} is not a number: {value:?}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },
}

/// A header plus rows of string cells. Rows shorter than the header
/// are padded with empty cells on construction, so every row has
/// exactly `header.len()` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterTable {
    header: Vec<KString>,
    rows: Vec<Vec<String>>,
}

impl CounterTable {
    pub fn new(header: Vec<KString>, mut rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        let expected = header.len();
        for (row, cells) in rows.iter_mut().enumerate() {
            let got = cells.len();
            if got > expected {
                return Err(TableError::RaggedRow { row, got, expected });
            }
            cells.resize(expected, String::new());
        }
        Ok(Self { header, rows })
    }

    /// Convenience constructor from numeric values, `None` becoming
    /// an empty cell.
    pub fn from_values<S: AsRef<str>>(
        header: &[S],
        rows: impl IntoIterator<Item = Vec<Option<f64>>>,
    ) -> Result<Self, TableError> {
        let header = header.iter().map(|s| KString::from_ref(s.as_ref())).collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self::new(header, rows)
    }

    pub fn header(&self) -> &[KString] {
        &self.header
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.as_str() == name)
    }

    /// The raw cell, `None` if it is empty (or only whitespace).
    /// Panics for out of range indices.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        let s = self.rows[row][column].as_str();
        if s.trim().is_empty() { None } else { Some(s) }
    }

    /// The cell parsed as a float; `Ok(None)` for an empty cell.
    pub fn value(&self, row: usize, column: usize) -> Result<Option<f64>, TableError> {
        let Some(s) = self.cell(row, column) else {
            return Ok(None);
        };
        s.trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| TableError::InvalidCell {
                row,
                column: self.header[column].to_string(),
                value: s.to_string(),
            })
    }

    pub fn check_same_header(&self, other: &CounterTable) -> Result<(), TableError> {
        if self.header == other.header {
            Ok(())
        } else {
            Err(TableError::HeaderMismatch {
                left: self.header.iter().map(|h| h.to_string()).collect(),
                right: other.header.iter().map(|h| h.to_string()).collect(),
            })
        }
    }

    pub fn from_csv_str(s: &str) -> Result<Self, TableError> {
        let mut records = parse_csv_records(s)?.into_iter();
        let header = records
            .next()
            .ok_or(TableError::NoHeader)?
            .into_iter()
            .map(KString::from_string)
            .collect();
        Self::new(header, records.collect())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| anyhow!("reading counter table from {path:?}"))?;
        Self::from_csv_str(&s).with_context(|| anyhow!("parsing counter table {path:?}"))
    }

    pub fn to_csv_string(&self) -> String {
        let mut out = csv_line(self.header.iter().map(|h| h.as_str()));
        for row in &self.rows {
            out.push_str(&csv_line(row.iter().map(|c| c.as_str())));
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv_string())
            .with_context(|| anyhow!("writing counter table to {path:?}"))
    }
}

fn csv_line<'s>(cells: impl Iterator<Item = &'s str>) -> String {
    let mut line = cells.map(quote_csv_field).join(",");
    line.push('\n');
    line
}

fn quote_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into records. Fields may be double-quoted, with
/// `""` for a literal quote inside; quoted fields may span lines.
/// Blank lines are skipped.
fn parse_csv_records(s: &str) -> Result<Vec<Vec<String>>, TableError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut quote_start_line = 1;

    let mut finish_record = |record: &mut Vec<String>, field: &mut String| {
        record.push(std::mem::take(field));
        let record = std::mem::take(record);
        if !(record.len() == 1 && record[0].is_empty()) {
            records.push(record);
        }
    };

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' if field.is_empty() => {
                    in_quotes = true;
                    quote_start_line = line;
                }
                ',' => record.push(std::mem::take(&mut field)),
                '\r' if chars.peek() == Some(&'\n') => (),
                '\n' => {
                    line += 1;
                    finish_record(&mut record, &mut field);
                }
                _ => field.push(c),
            }
        }
    }
    if in_quotes {
        return Err(TableError::UnterminatedQuote {
            line: quote_start_line,
        });
    }
    if !field.is_empty() || !record.is_empty() {
        finish_record(&mut record, &mut field);
    }
    Ok(records)
}
