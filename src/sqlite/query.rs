use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::OrmError;
use crate::results::D1Result;
use crate::types::SqlValue;

use super::params::Params;

/// Extract one cell from a `SQLite` row in its storage form.
///
/// # Errors
///
/// Returns `OrmError::Execution` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<SqlValue, OrmError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    })
}

/// Run a prepared statement and materialize every row it yields.
///
/// Works for plain SELECTs and for writes with a `RETURNING` clause; the
/// caller fills in the metadata.
///
/// # Errors
/// Returns the translated engine error if execution or extraction fails.
pub fn build_result_set(stmt: &mut Statement<'_>, params: &Params) -> Result<D1Result, OrmError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(&params.as_refs()[..])?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(sqlite_extract_value_sync(row, idx)?);
        }
        rows.push(values);
    }
    Ok(D1Result::from_rows(column_names, rows))
}
