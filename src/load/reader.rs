// src/load/reader.rs

use arrow::{
    array::{ArrayRef, Int32Array},
    csv::ReaderBuilder,
    datatypes::SchemaRef,
    record_batch::RecordBatch,
};
use std::{fs::File, path::Path, sync::Arc};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Field separator of the batch files.
pub const DELIMITER: u8 = b'|';

/// Rows per Arrow batch while decoding.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Decode one `|`-delimited, header-less file against `source_schema` and
/// append the constant `batch_id` column, producing batches of
/// `table_schema`.
///
/// Any row with the wrong field count or an undecodable value fails the
/// whole file.
pub fn read_batch_file(
    path: &Path,
    source_schema: SchemaRef,
    table_schema: SchemaRef,
    batch_id: i32,
    batch_size: usize,
    table: &str,
) -> Result<Vec<RecordBatch>> {
    let mismatch = |reason: String| LoadError::SchemaMismatch {
        table: table.to_string(),
        path: Some(path.to_path_buf()),
        reason,
    };

    let file = File::open(path)
        .map_err(|e| LoadError::io(format!("opening {}", path.display()), e))?;
    let reader = ReaderBuilder::new(source_schema)
        .with_header(false)
        .with_delimiter(DELIMITER)
        .with_batch_size(batch_size)
        .build(file)
        .map_err(|e| mismatch(e.to_string()))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| mismatch(e.to_string()))?;
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(Int32Array::from(vec![batch_id; batch.num_rows()])));
        let with_id = RecordBatch::try_new(table_schema.clone(), columns)
            .map_err(|e| mismatch(e.to_string()))?;
        out.push(with_id);
    }

    let rows: usize = out.iter().map(RecordBatch::num_rows).sum();
    debug!(path = %path.display(), batch_id, rows, "decoded file");
    Ok(out)
}
