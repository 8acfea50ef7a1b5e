// src/warehouse/mod.rs

use arrow::{array::Int32Array, datatypes::SchemaRef, record_batch::RecordBatch};
use std::collections::BTreeMap;

use crate::error::{LoadError, Result};
use crate::ident::TableIdent;
use crate::schema::{TableDefinition, BATCH_ID_COLUMN};

pub mod memory;
pub mod parquet_store;

pub use self::memory::MemoryStore;
pub use self::parquet_store::ParquetStore;

/// An open full-replace of one table's content.
///
/// Batches written here are invisible until `commit`. Dropping the sink
/// without committing discards them and leaves the previous content.
pub trait ReplaceSink {
    /// Append one batch. It must carry the table's arrow schema.
    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Publish everything written, returning the table's new row count.
    fn commit(self: Box<Self>) -> Result<u64>;
}

/// Where provisioned tables live.
///
/// Both mutating operations are whole-table: `create_or_replace` drops any
/// previous table, and a committed replace swaps the full content so a
/// concurrent `scan` sees either the old or the new rows, never a mix.
pub trait TableStore: Send + Sync {
    /// Drop whatever exists at `def.ident` and create an empty table.
    fn create_or_replace(&self, def: &TableDefinition) -> Result<()>;

    /// The stored definition, or `None` if the table was never provisioned.
    fn definition(&self, ident: &TableIdent) -> Result<Option<TableDefinition>>;

    /// Start replacing the content of `def.ident`.
    fn begin_replace<'a>(&'a self, def: &TableDefinition) -> Result<Box<dyn ReplaceSink + 'a>>;

    /// Replace the table content with `batches`, returning the rows written.
    fn replace_rows(&self, def: &TableDefinition, batches: &[RecordBatch]) -> Result<u64> {
        let mut sink = self.begin_replace(def)?;
        for batch in batches {
            sink.write(batch)?;
        }
        sink.commit()
    }

    /// All rows currently in the table.
    fn scan(&self, ident: &TableIdent) -> Result<Vec<RecordBatch>>;

    fn row_count(&self, ident: &TableIdent) -> Result<u64> {
        Ok(self
            .scan(ident)?
            .iter()
            .map(|b| b.num_rows() as u64)
            .sum())
    }
}

pub(crate) fn check_batch_schema(
    ident: &TableIdent,
    schema: &SchemaRef,
    batch: &RecordBatch,
) -> Result<()> {
    if batch.schema().fields() != schema.fields() {
        return Err(LoadError::SchemaMismatch {
            table: ident.to_string(),
            path: None,
            reason: "batch schema differs from the table schema".to_string(),
        });
    }
    Ok(())
}

/// Row counts per batch number, read from the batch column.
pub fn batch_counts(batches: &[RecordBatch]) -> BTreeMap<i32, u64> {
    let mut counts = BTreeMap::new();
    for batch in batches {
        let Some(ids) = batch
            .column_by_name(BATCH_ID_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        else {
            continue;
        };
        for id in ids.iter().flatten() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}
