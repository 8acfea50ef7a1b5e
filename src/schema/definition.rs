// src/schema/definition.rs

use arrow::datatypes::Schema as ArrowSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::arrow::build_arrow_schema;
use super::constraints::{parse_constraints, Constraint};
use super::parse::parse_columns;
use super::properties::TableProperties;
use super::types::{Column, BATCH_ID_COLUMN};
use crate::error::{LoadError, Result};
use crate::ident::TableIdent;

/// Everything a store needs to (re)create a table.
///
/// `columns` always ends with the batch column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub ident: TableIdent,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub properties: TableProperties,
    pub created_at: DateTime<Utc>,
}

impl TableDefinition {
    /// Compose a definition from the raw declaration fragments.
    pub fn compose(
        ident: TableIdent,
        column_schema: &str,
        constraints: &str,
        properties: &str,
    ) -> Result<Self> {
        let table = ident.to_string();
        let mut columns = parse_columns(column_schema, &table)?;
        let constraints = parse_constraints(constraints, &columns, &table)?;
        let properties = TableProperties::parse(properties, &table)?;

        for c in &constraints {
            if let Constraint::PrimaryKey { columns: keys, .. } = c {
                for col in columns.iter_mut().filter(|col| keys.contains(&col.name)) {
                    col.nullable = false;
                }
            }
        }
        columns.push(Column::batch_id());

        Ok(Self {
            ident,
            columns,
            constraints,
            properties,
            created_at: Utc::now(),
        })
    }

    /// Columns the source files carry, i.e. everything but the batch column.
    pub fn source_columns(&self) -> &[Column] {
        &self.columns[..self.columns.len().saturating_sub(1)]
    }

    /// Arrow schema of the stored rows, batch column included.
    pub fn arrow_schema(&self) -> Arc<ArrowSchema> {
        build_arrow_schema(&self.columns)
    }

    /// Arrow schema used to decode source files.
    pub fn source_schema(&self) -> Arc<ArrowSchema> {
        build_arrow_schema(self.source_columns())
    }

    /// Check that `declared` has the same names and types, in order, as this
    /// definition's source columns.
    pub fn ensure_compatible(&self, declared: &[Column]) -> Result<()> {
        let stored = self.source_columns();
        let mismatch = |reason: String| LoadError::SchemaMismatch {
            table: self.ident.to_string(),
            path: None,
            reason,
        };
        if stored.len() != declared.len() {
            return Err(mismatch(format!(
                "table has {} columns before `{}`, declared schema has {}",
                stored.len(),
                BATCH_ID_COLUMN,
                declared.len()
            )));
        }
        for (pos, (s, d)) in stored.iter().zip(declared).enumerate() {
            if !s.name.eq_ignore_ascii_case(&d.name) || s.ty != d.ty {
                return Err(mismatch(format!(
                    "column {} is `{} {}` in the table but `{} {}` in the declared schema",
                    pos + 1,
                    s.name,
                    s.ty,
                    d.name,
                    d.ty
                )));
            }
        }
        Ok(())
    }

    /// Native DDL for this definition.
    pub fn to_ddl(&self) -> String {
        let mut body: Vec<String> = self.columns.iter().map(Column::to_sql).collect();
        body.extend(self.constraints.iter().map(Constraint::to_sql));
        let mut ddl = format!(
            "CREATE OR REPLACE TABLE {} (\n  {}\n)",
            self.ident,
            body.join(",\n  ")
        );
        if !self.properties.is_empty() {
            ddl.push(' ');
            ddl.push_str(&self.properties.to_sql());
        }
        ddl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ColumnType;

    fn ident() -> TableIdent {
        TableIdent::from_params("tpcdi", "wh", 3, "DimBroker").unwrap()
    }

    #[test]
    fn batch_column_is_last_and_pk_is_not_null() {
        let def = TableDefinition::compose(
            ident(),
            "sk_brokerid BIGINT, brokerid BIGINT, name STRING",
            "CONSTRAINT pk PRIMARY KEY (sk_brokerid)",
            "",
        )
        .unwrap();

        let last = def.columns.last().unwrap();
        assert_eq!(last.name, BATCH_ID_COLUMN);
        assert_eq!(last.ty, ColumnType::Int);
        assert!(last.nullable);
        assert!(!def.columns[0].nullable);
        assert!(def.columns[1].nullable);
        assert_eq!(def.source_columns().len(), 3);
        assert_eq!(def.arrow_schema().fields().len(), 4);
    }

    #[test]
    fn ddl_places_batch_column_before_constraints() {
        let def = TableDefinition::compose(
            ident(),
            "id BIGINT",
            ", PRIMARY KEY (id)",
            "TBLPROPERTIES ('parquet.compression' = 'zstd')",
        )
        .unwrap();
        assert_eq!(
            def.to_ddl(),
            "CREATE OR REPLACE TABLE tpcdi.wh_3.DimBroker (\n  id BIGINT NOT NULL,\n  \
             batchid INT COMMENT 'Batch ID when this record was inserted',\n  \
             PRIMARY KEY (id)\n) TBLPROPERTIES ('parquet.compression' = 'zstd')"
        );
    }

    #[test]
    fn compatibility_is_positional() {
        let def = TableDefinition::compose(ident(), "a INT, b STRING", "", "").unwrap();
        assert!(def
            .ensure_compatible(&parse_columns("A INT, b STRING", "t").unwrap())
            .is_ok());
        for other in ["b STRING, a INT", "a INT", "a BIGINT, b STRING"] {
            let err = def
                .ensure_compatible(&parse_columns(other, "t").unwrap())
                .unwrap_err();
            assert!(matches!(err, LoadError::SchemaMismatch { .. }), "{}", other);
        }
    }
}
