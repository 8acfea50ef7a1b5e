// src/warehouse/parquet_store.rs

use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use super::{check_batch_schema, ReplaceSink, TableStore};
use crate::error::{LoadError, Result};
use crate::ident::TableIdent;
use crate::schema::properties::{COMPRESSION_KEY, ROW_GROUP_SIZE_KEY};
use crate::schema::{TableDefinition, TableProperties};

const DEFINITION_FILE: &str = "_definition.json";
const DATA_FILE: &str = "data.parquet";

/// Tables as directories of `<root>/<catalog>/<database>/<table>/`, each
/// holding `_definition.json` and a single `data.parquet`.
///
/// Content is replaced by writing `.data.parquet.tmp` and renaming it over
/// `data.parquet`, so readers that open the file see one full snapshot.
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, ident: &TableIdent) -> PathBuf {
        self.root
            .join(&ident.catalog)
            .join(&ident.database)
            .join(&ident.table)
    }

    fn data_path(&self, ident: &TableIdent) -> PathBuf {
        self.table_dir(ident).join(DATA_FILE)
    }

    fn fs_error(ident: &TableIdent, path: &Path, what: &str, e: io::Error) -> LoadError {
        if e.kind() == io::ErrorKind::PermissionDenied {
            LoadError::Permission {
                table: ident.to_string(),
                location: path.display().to_string(),
                source: e,
            }
        } else {
            LoadError::io(format!("{} {}", what, path.display()), e)
        }
    }

    fn parquet_error(ident: &TableIdent) -> impl Fn(parquet::errors::ParquetError) -> LoadError + '_ {
        move |source| LoadError::Parquet {
            table: ident.to_string(),
            source,
        }
    }

    /// Write the definition atomically: to a dot-tmp file, then rename.
    fn write_definition(&self, def: &TableDefinition) -> Result<()> {
        let dir = self.table_dir(&def.ident);
        let path = dir.join(DEFINITION_FILE);
        let tmp_path = dir.join(format!(".{}.tmp", DEFINITION_FILE));

        let mut tmp = File::create(&tmp_path)
            .map_err(|e| Self::fs_error(&def.ident, &tmp_path, "creating", e))?;
        serde_json::to_writer_pretty(&mut tmp, def).map_err(|source| LoadError::Definition {
            path: tmp_path.clone(),
            source,
        })?;
        tmp.write_all(b"\n")
            .map_err(|e| Self::fs_error(&def.ident, &tmp_path, "writing", e))?;

        fs::rename(&tmp_path, &path)
            .map_err(|e| Self::fs_error(&def.ident, &path, "renaming into", e))
    }

    /// Open a writer on `.data.parquet.tmp` for `def`.
    fn open_sink(&self, def: &TableDefinition) -> Result<ParquetSink> {
        let dir = self.table_dir(&def.ident);
        let final_path = dir.join(DATA_FILE);
        let tmp_path = dir.join(format!(".{}.tmp", DATA_FILE));

        let schema = def.arrow_schema();
        let file = File::create(&tmp_path)
            .map_err(|e| Self::fs_error(&def.ident, &tmp_path, "creating", e))?;
        let mut sink = ParquetSink {
            ident: def.ident.clone(),
            schema: schema.clone(),
            tmp_path,
            final_path,
            writer: None,
            rows: 0,
            committed: false,
        };
        let writer = ArrowWriter::try_new(
            BufWriter::new(file),
            schema,
            Some(writer_properties(&def.properties)),
        )
        .map_err(Self::parquet_error(&def.ident))?;
        sink.writer = Some(writer);
        Ok(sink)
    }
}

/// Streams batches into `.data.parquet.tmp`; `commit` renames it over
/// `data.parquet`. Dropped uncommitted, it deletes the tmp file.
pub struct ParquetSink {
    ident: TableIdent,
    schema: SchemaRef,
    tmp_path: PathBuf,
    final_path: PathBuf,
    writer: Option<ArrowWriter<BufWriter<File>>>,
    rows: u64,
    committed: bool,
}

impl ReplaceSink for ParquetSink {
    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        check_batch_schema(&self.ident, &self.schema, batch)?;
        let Some(writer) = self.writer.as_mut() else {
            return Err(LoadError::io(
                format!("writing {}", self.tmp_path.display()),
                io::Error::new(io::ErrorKind::Other, "writer already closed"),
            ));
        };
        writer
            .write(batch)
            .map_err(ParquetStore::parquet_error(&self.ident))?;
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer
                .close()
                .map_err(ParquetStore::parquet_error(&self.ident))?;
        }
        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| {
            ParquetStore::fs_error(&self.ident, &self.final_path, "renaming into", e)
        })?;
        self.committed = true;
        debug!(table = %self.ident, rows = self.rows, path = %self.final_path.display(), "wrote data file");
        Ok(self.rows)
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.writer.take());
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.tmp_path.display(), error = %e, "could not remove abandoned data file");
            }
        } else {
            debug!(table = %self.ident, path = %self.tmp_path.display(), "discarded uncommitted data file");
        }
    }
}

/// Map stored table properties onto Parquet writer settings.
fn writer_properties(props: &TableProperties) -> WriterProperties {
    let compression = match props
        .get(COMPRESSION_KEY)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("zstd") => Compression::ZSTD(ZstdLevel::default()),
        Some("brotli") => Compression::BROTLI(BrotliLevel::default()),
        Some("gzip") => Compression::GZIP(GzipLevel::default()),
        Some("lz4") => Compression::LZ4_RAW,
        Some("uncompressed") => Compression::UNCOMPRESSED,
        _ => Compression::SNAPPY,
    };
    let mut builder = WriterProperties::builder().set_compression(compression);
    if let Some(n) = props
        .get(ROW_GROUP_SIZE_KEY)
        .and_then(|n| n.parse::<usize>().ok())
    {
        builder = builder.set_max_row_group_size(n);
    }
    builder.build()
}

impl TableStore for ParquetStore {
    fn create_or_replace(&self, def: &TableDefinition) -> Result<()> {
        let dir = self.table_dir(&def.ident);
        if dir.exists() {
            info!(table = %def.ident, dir = %dir.display(), "dropping existing table");
            fs::remove_dir_all(&dir).map_err(|e| Self::fs_error(&def.ident, &dir, "removing", e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| Self::fs_error(&def.ident, &dir, "creating", e))?;

        self.write_definition(def)?;
        Box::new(self.open_sink(def)?).commit()?;
        Ok(())
    }

    fn definition(&self, ident: &TableIdent) -> Result<Option<TableDefinition>> {
        let path = self.table_dir(ident).join(DEFINITION_FILE);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::fs_error(ident, &path, "opening", e)),
        };
        serde_json::from_reader(io::BufReader::new(file))
            .map(Some)
            .map_err(|source| LoadError::Definition { path, source })
    }

    fn begin_replace<'a>(&'a self, def: &TableDefinition) -> Result<Box<dyn ReplaceSink + 'a>> {
        if !self.table_dir(&def.ident).is_dir() {
            return Err(LoadError::TableNotFound(def.ident.to_string()));
        }
        Ok(Box::new(self.open_sink(def)?))
    }

    fn scan(&self, ident: &TableIdent) -> Result<Vec<RecordBatch>> {
        let path = self.data_path(ident);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::TableNotFound(ident.to_string()))
            }
            Err(e) => return Err(Self::fs_error(ident, &path, "opening", e)),
        };
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(Self::parquet_error(ident))?
            .with_batch_size(8192)
            .build()
            .map_err(Self::parquet_error(ident))?;

        reader
            .map(|b| {
                b.map_err(|source| LoadError::Arrow {
                    table: ident.to_string(),
                    source,
                })
            })
            .collect()
    }

    fn row_count(&self, ident: &TableIdent) -> Result<u64> {
        let path = self.data_path(ident);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::TableNotFound(ident.to_string()))
            }
            Err(e) => return Err(Self::fs_error(ident, &path, "opening", e)),
        };
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(Self::parquet_error(ident))?;
        Ok(builder.metadata().file_metadata().num_rows() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int32Array, Int64Array, StringArray};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn definition(props: &str) -> TableDefinition {
        let ident = TableIdent::from_params("tpcdi", "wh", 1, "DimBroker").unwrap();
        TableDefinition::compose(ident, "id BIGINT, name STRING", "", props).unwrap()
    }

    fn definition_with(columns: &str) -> TableDefinition {
        let ident = TableIdent::from_params("tpcdi", "wh", 1, "DimBroker").unwrap();
        TableDefinition::compose(ident, columns, "", "").unwrap()
    }

    fn rows(def: &TableDefinition, ids: &[i64], batch: i32) -> RecordBatch {
        let names: Vec<String> = ids.iter().map(|i| format!("n{}", i)).collect();
        RecordBatch::try_new(
            def.arrow_schema(),
            vec![
                Arc::new(Int64Array::from(ids.to_vec())) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(Int32Array::from(vec![batch; ids.len()])) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn provisioned_table_is_empty_and_keeps_its_definition() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ParquetStore::new(dir.path());
        let def = definition("TBLPROPERTIES ('parquet.compression' = 'zstd')");

        store.create_or_replace(&def)?;
        assert_eq!(store.row_count(&def.ident)?, 0);
        assert_eq!(store.definition(&def.ident)?, Some(def.clone()));
        assert!(store
            .table_dir(&def.ident)
            .ends_with("tpcdi/wh_1/DimBroker"));
        Ok(())
    }

    #[test]
    fn replace_swaps_whole_content_and_roundtrips_schema() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ParquetStore::new(dir.path());
        let def = definition("");
        store.create_or_replace(&def)?;

        store.replace_rows(&def, &[rows(&def, &[1, 2, 3], 1)])?;
        let written = store.replace_rows(&def, &[rows(&def, &[7], 2), rows(&def, &[8], 3)])?;
        assert_eq!(written, 2);

        let batches = store.scan(&def.ident)?;
        let schema = batches[0].schema();
        let expected = def.arrow_schema();
        for (got, want) in schema.fields().iter().zip(expected.fields().iter()) {
            assert_eq!(got.name(), want.name());
            assert_eq!(got.data_type(), want.data_type());
            assert_eq!(got.is_nullable(), want.is_nullable());
        }
        assert_eq!(store.row_count(&def.ident)?, 2);
        assert_eq!(
            crate::warehouse::batch_counts(&batches).into_iter().collect::<Vec<_>>(),
            vec![(2, 1), (3, 1)]
        );
        assert!(!store.table_dir(&def.ident).join(".data.parquet.tmp").exists());
        Ok(())
    }

    #[test]
    fn failed_replace_keeps_old_rows_and_no_tmp_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ParquetStore::new(dir.path());
        let def = definition("");
        store.create_or_replace(&def)?;
        store.replace_rows(&def, &[rows(&def, &[1, 2], 1)])?;
        let tmp = store.table_dir(&def.ident).join(".data.parquet.tmp");

        {
            let mut sink = store.begin_replace(&def)?;
            sink.write(&rows(&def, &[5, 6, 7], 2))?;
            assert!(tmp.exists());
        }
        assert!(!tmp.exists());
        assert_eq!(store.row_count(&def.ident)?, 2);

        let other = definition_with("id BIGINT, name STRING, extra INT");
        let mut sink = store.begin_replace(&def)?;
        sink.write(&rows(&def, &[9], 3))?;
        let wrong = RecordBatch::new_empty(other.arrow_schema());
        assert!(matches!(
            sink.write(&wrong),
            Err(LoadError::SchemaMismatch { .. })
        ));
        drop(sink);
        assert!(!tmp.exists());
        assert_eq!(
            crate::warehouse::batch_counts(&store.scan(&def.ident)?)
                .into_iter()
                .collect::<Vec<_>>(),
            vec![(1, 2)]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn read_only_catalog_is_permission_error() -> anyhow::Result<()> {
        use crate::provision::TableProvisioner;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let catalog = dir.path().join("tpcdi");
        fs::create_dir_all(&catalog)?;
        fs::set_permissions(&catalog, fs::Permissions::from_mode(0o555))?;

        // Privileged users ignore mode bits; nothing to observe then.
        let writable = fs::create_dir(catalog.join("write_check")).is_ok();
        let result = if writable {
            None
        } else {
            let store = ParquetStore::new(dir.path());
            let ident = TableIdent::from_params("tpcdi", "wh", 1, "DimBroker")?;
            Some(TableProvisioner::new(&store).provision(&ident, "id BIGINT", "", ""))
        };
        fs::set_permissions(&catalog, fs::Permissions::from_mode(0o755))?;

        if let Some(result) = result {
            match result {
                Err(LoadError::Permission { table, location, .. }) => {
                    assert_eq!(table, "tpcdi.wh_1.DimBroker");
                    assert!(location.contains("wh_1"));
                }
                other => panic!("expected permission error, got {:?}", other),
            }
        }
        Ok(())
    }

    #[test]
    fn missing_table_is_reported() {
        let dir = tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let def = definition("");
        assert!(store.definition(&def.ident).unwrap().is_none());
        assert!(matches!(
            store.replace_rows(&def, &[]),
            Err(LoadError::TableNotFound(_))
        ));
        assert!(matches!(
            store.scan(&def.ident),
            Err(LoadError::TableNotFound(_))
        ));
    }
}
