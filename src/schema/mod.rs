pub mod arrow;
pub mod constraints;
pub mod definition;
pub mod parse;
pub mod properties;
pub mod types;

pub use self::arrow::{build_arrow_schema, map_to_arrow_type};
pub use constraints::Constraint;
pub use definition::TableDefinition;
pub use parse::parse_columns;
pub use properties::TableProperties;
pub use types::{Column, ColumnType, BATCH_ID_COLUMN};
