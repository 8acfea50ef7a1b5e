pub mod config;
pub mod error;
pub mod ident;
pub mod load;
pub mod provision;
pub mod schema;
pub mod stage;
pub mod warehouse;

pub use config::JobConfig;
pub use error::{LoadError, Result};
pub use ident::TableIdent;
pub use load::{BatchIdExtractor, BatchLoader, DigitWidth, LoadReport};
pub use provision::TableProvisioner;
pub use schema::TableDefinition;
pub use stage::{stage_raw_files, StageOptions, StageReport};
pub use warehouse::{batch_counts, MemoryStore, ParquetStore, ReplaceSink, TableStore};
