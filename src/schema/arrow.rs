// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use std::{collections::HashMap, sync::Arc};

use super::types::{Column, ColumnType};

/// Field metadata key holding a column comment.
pub const COMMENT_KEY: &str = "comment";

/// Map a declared column type onto an Arrow DataType.
///
/// - STRING, CHAR(n), VARCHAR(n) → Utf8
/// - TINYINT / SMALLINT / INT / BIGINT → Int8 / Int16 / Int32 / Int64
/// - FLOAT / DOUBLE                   → Float32 / Float64
/// - DECIMAL(p,s)                     → Decimal128(p, s)
/// - BOOLEAN                          → Boolean
/// - DATE                             → Date32
/// - TIMESTAMP                        → Timestamp(µs, no zone)
pub fn map_to_arrow_type(ty: &ColumnType) -> DataType {
    match *ty {
        ColumnType::String | ColumnType::Char { .. } | ColumnType::Varchar { .. } => {
            DataType::Utf8
        }
        ColumnType::TinyInt => DataType::Int8,
        ColumnType::SmallInt => DataType::Int16,
        ColumnType::Int => DataType::Int32,
        ColumnType::BigInt => DataType::Int64,
        ColumnType::Float => DataType::Float32,
        ColumnType::Double => DataType::Float64,
        ColumnType::Decimal { precision, scale } => DataType::Decimal128(precision, scale),
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

pub fn arrow_field(col: &Column) -> ArrowField {
    let field = ArrowField::new(&col.name, map_to_arrow_type(&col.ty), col.nullable);
    match &col.comment {
        Some(c) => field.with_metadata(HashMap::from([(COMMENT_KEY.to_string(), c.clone())])),
        None => field,
    }
}

/// Build an ArrowSchema (inside an Arc) from a slice of `Column`s, in order.
pub fn build_arrow_schema(cols: &[Column]) -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(
        cols.iter().map(arrow_field).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse::parse_columns;

    #[test]
    fn schema_keeps_order_nullability_and_comments() {
        let mut cols = parse_columns(
            "id BIGINT NOT NULL COMMENT 'key', price DECIMAL(8,2), at TIMESTAMP",
            "t",
        )
        .unwrap();
        cols.push(Column::batch_id());
        let schema = build_arrow_schema(&cols);

        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "price", "at", "batchid"]);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(
            schema.field(0).metadata().get(COMMENT_KEY).map(String::as_str),
            Some("key")
        );
        assert_eq!(schema.field(1).data_type(), &DataType::Decimal128(8, 2));
        assert_eq!(schema.field(3).data_type(), &DataType::Int32);
        assert!(schema.field(3).is_nullable());
    }
}
