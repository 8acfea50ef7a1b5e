// src/ident.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LoadError, Result};

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// Three-part table name: `catalog.database.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    pub catalog: String,
    pub database: String,
    pub table: String,
}

impl TableIdent {
    /// Assemble the identifier the way both provisioning and loading must
    /// see it: the database is `<warehouse_db>_<scale_factor>`.
    pub fn from_params(
        catalog: &str,
        warehouse_db: &str,
        scale_factor: u32,
        table_name: &str,
    ) -> Result<Self> {
        Self::new(
            catalog,
            &format!("{}_{}", warehouse_db, scale_factor),
            table_name,
        )
    }

    pub fn new(catalog: &str, database: &str, table: &str) -> Result<Self> {
        for (what, part) in [("catalog", catalog), ("database", database), ("table", table)] {
            if !PLAIN_IDENT.is_match(part) {
                return Err(LoadError::Config(format!(
                    "{} name `{}` is not a plain identifier",
                    what, part
                )));
            }
        }
        Ok(Self {
            catalog: catalog.to_string(),
            database: database.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.database, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_carries_scale_factor() {
        let id = TableIdent::from_params("tpcdi", "tpcdi_wh", 10, "DimCustomer").unwrap();
        assert_eq!(id.database, "tpcdi_wh_10");
        assert_eq!(id.to_string(), "tpcdi.tpcdi_wh_10.DimCustomer");
        assert_eq!(
            id,
            TableIdent::from_params("tpcdi", "tpcdi_wh", 10, "DimCustomer").unwrap()
        );
    }

    #[test]
    fn rejects_path_like_parts() {
        assert!(matches!(
            TableIdent::from_params("tpcdi", "../etc", 1, "t"),
            Err(LoadError::Config(_))
        ));
        assert!(TableIdent::new("c", "d", "").is_err());
        assert!(TableIdent::new("c", "d", "a.b").is_err());
    }
}
