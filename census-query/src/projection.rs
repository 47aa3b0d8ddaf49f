//! Requested columns vs. physically read columns.
//!
//! The first read of an axis must return `soma_joinid` so the identifier
//! cache can be filled, whatever the caller asked for. [`physical_read_columns`]
//! widens the request; [`project_columns`] narrows the result back.

use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};
use census_storage::SOMA_JOINID;

/// Columns to request from storage. `None` means every column, which already
/// includes `soma_joinid`.
pub fn physical_read_columns(
    requested: Option<&[String]>,
    need_joinids: bool,
) -> Option<Vec<String>> {
    let requested = requested?;
    if need_joinids && !requested.iter().any(|c| c == SOMA_JOINID) {
        let mut cols = Vec::with_capacity(requested.len() + 1);
        cols.push(SOMA_JOINID.to_string());
        cols.extend(requested.iter().cloned());
        return Some(cols);
    }
    Some(requested.to_vec())
}

/// Select exactly `requested` from `batch`, in that order.
pub fn project_columns(batch: &RecordBatch, requested: Option<&[String]>) -> Result<RecordBatch> {
    let Some(requested) = requested else {
        return Ok(batch.clone());
    };
    let schema = batch.schema();
    let indices = requested
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| Error::not_found(format!("column '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(batch.project(&indices)?)
}

/// Remove `column` if present.
pub(crate) fn drop_column(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name() != column)
        .map(|(i, _)| i)
        .collect();
    if keep.len() == schema.fields().len() {
        return Ok(batch.clone());
    }
    Ok(batch.project(&keep)?)
}
