//! Merging repeated counter captures of the same frames into one
//! table, taking the per-cell minimum to suppress noise.

use kstring::KString;

use crate::{
    counter_table::{CounterTable, TableError},
    debug, warn,
};

/// The number of runs the capture workflow records per trace.
pub const COLLATE_RUNS: usize = 3;

/// The cell-wise minimum over `tables`, which must share the same
/// header and row count. Empty cells are ignored; a cell empty in
/// every table stays empty.
pub fn collate(tables: &[CounterTable]) -> Result<CounterTable, TableError> {
    collate_runs(tables, COLLATE_RUNS)
}

/// `collate`, warning if the number of tables is not `expected_runs`.
pub fn collate_runs(
    tables: &[CounterTable],
    expected_runs: usize,
) -> Result<CounterTable, TableError> {
    let (first, rest) = tables.split_first().ok_or(TableError::NoTables)?;
    if tables.len() != expected_runs {
        warn!("collating {} runs, expected {expected_runs}", tables.len());
    }
    for table in rest {
        first.check_same_header(table)?;
    }
    if rest.iter().any(|table| table.num_rows() != first.num_rows()) {
        return Err(TableError::RowCountMismatch {
            counts: tables.iter().map(|t| t.num_rows()).collect(),
        });
    }

    let num_columns = first.header().len();
    let mut rows = Vec::with_capacity(first.num_rows());
    for row in 0..first.num_rows() {
        let mut cells = Vec::with_capacity(num_columns);
        for column in 0..num_columns {
            let mut min: Option<f64> = None;
            for (run, table) in tables.iter().enumerate() {
                match table.value(row, column)? {
                    Some(v) => {
                        min = Some(min.map_or(v, |m| m.min(v)));
                    }
                    None => {
                        warn!(
                            "empty cell in run {run}, row {row}, column {:?}, ignoring it",
                            first.header()[column].as_str()
                        );
                    }
                }
            }
            cells.push(min.map(|v| v.to_string()).unwrap_or_default());
        }
        rows.push(cells);
    }
    debug!(
        "collated {} runs of {} frames",
        tables.len(),
        first.num_rows()
    );

    let header: Vec<KString> = first.header().to_vec();
    CounterTable::new(header, rows)
}
