// src/warehouse/memory.rs

use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use std::{
    collections::{HashMap, HashSet},
    io,
    sync::RwLock,
};

use super::{check_batch_schema, ReplaceSink, TableStore};
use crate::error::{LoadError, Result};
use crate::ident::TableIdent;
use crate::schema::TableDefinition;

struct StoredTable {
    def: TableDefinition,
    batches: Vec<RecordBatch>,
}

/// In-process store. Replacing content swaps the batch list under a write
/// lock. Databases listed with [`MemoryStore::deny_database`] refuse
/// table creation, standing in for a namespace the caller cannot write.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<TableIdent, StoredTable>>,
    denied: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_database(&self, database: &str) {
        self.denied
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(database.to_string());
    }
}

/// Collects batches, then swaps them in under the write lock.
struct MemorySink<'a> {
    store: &'a MemoryStore,
    ident: TableIdent,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ReplaceSink for MemorySink<'_> {
    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        check_batch_schema(&self.ident, &self.schema, batch)?;
        self.batches.push(batch.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<u64> {
        let MemorySink {
            store,
            ident,
            batches,
            ..
        } = *self;
        let rows = batches.iter().map(|b| b.num_rows() as u64).sum();
        let mut tables = store.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables
            .get_mut(&ident)
            .ok_or_else(|| LoadError::TableNotFound(ident.to_string()))?;
        table.batches = batches;
        Ok(rows)
    }
}

impl TableStore for MemoryStore {
    fn create_or_replace(&self, def: &TableDefinition) -> Result<()> {
        let denied = self.denied.read().unwrap_or_else(|e| e.into_inner());
        if denied.contains(&def.ident.database) {
            return Err(LoadError::Permission {
                table: def.ident.to_string(),
                location: format!("memory:{}.{}", def.ident.catalog, def.ident.database),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "database is read-only"),
            });
        }
        self.tables.write().unwrap_or_else(|e| e.into_inner()).insert(
            def.ident.clone(),
            StoredTable {
                def: def.clone(),
                batches: Vec::new(),
            },
        );
        Ok(())
    }

    fn definition(&self, ident: &TableIdent) -> Result<Option<TableDefinition>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.get(ident).map(|t| t.def.clone()))
    }

    fn begin_replace<'a>(&'a self, def: &TableDefinition) -> Result<Box<dyn ReplaceSink + 'a>> {
        if self.definition(&def.ident)?.is_none() {
            return Err(LoadError::TableNotFound(def.ident.to_string()));
        }
        Ok(Box::new(MemorySink {
            store: self,
            ident: def.ident.clone(),
            schema: def.arrow_schema(),
            batches: Vec::new(),
        }))
    }

    fn scan(&self, ident: &TableIdent) -> Result<Vec<RecordBatch>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(ident)
            .map(|t| t.batches.clone())
            .ok_or_else(|| LoadError::TableNotFound(ident.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_database_yields_permission_error() {
        let store = MemoryStore::new();
        store.deny_database("wh_1");
        let ident = TableIdent::from_params("c", "wh", 1, "t").unwrap();
        let def = TableDefinition::compose(ident.clone(), "a INT", "", "").unwrap();

        assert!(matches!(
            store.create_or_replace(&def),
            Err(LoadError::Permission { .. })
        ));
        assert!(store.definition(&ident).unwrap().is_none());
    }

    #[test]
    fn uncommitted_rows_stay_invisible() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let ident = TableIdent::from_params("c", "wh", 1, "t")?;
        let def = TableDefinition::compose(ident.clone(), "a INT", "", "")?;
        store.create_or_replace(&def)?;

        let batch = RecordBatch::new_empty(def.arrow_schema());
        let mut sink = store.begin_replace(&def)?;
        sink.write(&batch)?;
        assert!(store.scan(&ident)?.is_empty());
        assert_eq!(sink.commit()?, 0);
        assert_eq!(store.scan(&ident)?.len(), 1);
        Ok(())
    }
}
