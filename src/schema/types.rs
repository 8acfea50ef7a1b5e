// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the system-managed batch column appended to every table.
pub const BATCH_ID_COLUMN: &str = "batchid";

/// Comment attached to the batch column.
pub const BATCH_ID_COMMENT: &str = "Batch ID when this record was inserted";

/// Column types accepted in a schema declaration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Char { length: u32 },
    Varchar { length: u32 },
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: i8 },
    Boolean,
    Date,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => f.write_str("STRING"),
            ColumnType::Char { length } => write!(f, "CHAR({})", length),
            ColumnType::Varchar { length } => write!(f, "VARCHAR({})", length),
            ColumnType::TinyInt => f.write_str("TINYINT"),
            ColumnType::SmallInt => f.write_str("SMALLINT"),
            ColumnType::Int => f.write_str("INT"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Float => f.write_str("FLOAT"),
            ColumnType::Double => f.write_str("DOUBLE"),
            ColumnType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
        }
    }
}

/// A single column definition as parsed from a schema declaration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    /// The batch column every provisioned table ends with.
    pub fn batch_id() -> Self {
        Column {
            name: BATCH_ID_COLUMN.to_string(),
            ty: ColumnType::Int,
            nullable: true,
            comment: Some(BATCH_ID_COMMENT.to_string()),
        }
    }

    /// `name TYPE [NOT NULL] [COMMENT '...']`
    pub fn to_sql(&self) -> String {
        let mut out = format!("{} {}", self.name, self.ty);
        if !self.nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(c) = &self.comment {
            out.push_str(&format!(" COMMENT '{}'", c.replace('\'', "''")));
        }
        out
    }
}
