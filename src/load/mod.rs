// src/load/mod.rs

use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, instrument};

use crate::error::{LoadError, Result};
use crate::ident::TableIdent;
use crate::schema::parse_columns;
use crate::warehouse::{ReplaceSink, TableStore};

pub mod batch_id;
pub mod reader;
pub mod source;

pub use batch_id::{BatchIdExtractor, DigitWidth, DEFAULT_MARKER};
pub use reader::{read_batch_file, DEFAULT_BATCH_SIZE, DELIMITER};
pub use source::{resolve_source_files, scale_factor_dir};

/// One source file that went into a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoad {
    pub path: PathBuf,
    pub batch_id: i32,
    pub rows: u64,
}

/// Outcome of a full-replace load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub table: TableIdent,
    /// Rows now in the table.
    pub rows: u64,
    pub files: Vec<FileLoad>,
}

impl LoadReport {
    /// Rows per batch number.
    pub fn rows_per_batch(&self) -> BTreeMap<i32, u64> {
        let mut out = BTreeMap::new();
        for f in &self.files {
            *out.entry(f.batch_id).or_insert(0) += f.rows;
        }
        out
    }
}

/// Scans batch directories and full-replaces one table with their rows.
pub struct BatchLoader<'s, S: TableStore + ?Sized> {
    store: &'s S,
    extractor: BatchIdExtractor,
    batch_size: usize,
}

impl<'s, S: TableStore + ?Sized> BatchLoader<'s, S> {
    pub fn new(store: &'s S, extractor: BatchIdExtractor) -> Self {
        Self {
            store,
            extractor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replace the content of `ident` with every row of every file matching
    /// `<root>/sf=<scale_factor>/<marker>*/<filename_pattern>`, each row
    /// tagged with the batch number of its directory.
    ///
    /// Paths are resolved and batch numbers extracted before any file is
    /// decoded. Files are then decoded a few at a time and streamed into one
    /// replace session that is committed only after the last file, so a
    /// failure leaves the previous content in place.
    #[instrument(level = "info", skip(self, root, column_schema), fields(table = %ident, root = %root.display()))]
    pub fn load_batches(
        &self,
        ident: &TableIdent,
        root: &Path,
        scale_factor: u32,
        filename_pattern: &str,
        column_schema: &str,
    ) -> Result<LoadReport> {
        let start = Instant::now();
        let table = ident.to_string();

        let declared = parse_columns(column_schema, &table)?;
        let def = self
            .store
            .definition(ident)?
            .ok_or_else(|| LoadError::TableNotFound(table.clone()))?;
        def.ensure_compatible(&declared)?;

        let paths = resolve_source_files(
            root,
            scale_factor,
            self.extractor.marker(),
            filename_pattern,
            &table,
        )?;
        let sources: Vec<(PathBuf, i32)> = paths
            .into_iter()
            .map(|path| match self.extractor.extract(&path) {
                Ok(id) => Ok((path, id)),
                Err(reason) => Err(LoadError::BatchExtraction {
                    table: table.clone(),
                    path,
                    reason,
                }),
            })
            .collect::<Result<_>>()?;
        info!(files = sources.len(), "resolved source files");

        let source_schema = def.source_schema();
        let table_schema = def.arrow_schema();
        let batch_size = self.batch_size;
        let group = rayon::current_num_threads().max(1);

        // Old content stays in place until commit; dropping the sink on an
        // error discards what was written so far.
        let mut sink = self.store.begin_replace(&def)?;
        let mut files = Vec::with_capacity(sources.len());
        for chunk in sources.chunks(group) {
            let decoded: Vec<Vec<RecordBatch>> = chunk
                .par_iter()
                .map(|(path, id)| {
                    read_batch_file(
                        path,
                        source_schema.clone(),
                        table_schema.clone(),
                        *id,
                        batch_size,
                        &table,
                    )
                })
                .collect::<Result<_>>()?;

            for ((path, id), batches) in chunk.iter().zip(decoded) {
                let mut rows = 0u64;
                for batch in &batches {
                    sink.write(batch)?;
                    rows += batch.num_rows() as u64;
                }
                files.push(FileLoad {
                    path: path.clone(),
                    batch_id: *id,
                    rows,
                });
            }
        }

        let rows = sink.commit()?;
        info!(rows, elapsed = ?start.elapsed(), "replaced table content");

        Ok(LoadReport {
            table: ident.clone(),
            rows,
            files,
        })
    }
}
