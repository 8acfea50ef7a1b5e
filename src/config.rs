// src/config.rs

use clap::Args;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{LoadError, Result};
use crate::ident::TableIdent;
use crate::load::{BatchIdExtractor, DigitWidth, DEFAULT_MARKER};

/// Store root used when neither the job file nor a flag names one.
pub const DEFAULT_WAREHOUSE: &str = "warehouse";

/// Job parameters, from a YAML file, from flags, or both.
///
/// Every field is optional here; the resolvers below report all missing
/// names at once.
#[derive(Debug, Clone, Default, PartialEq, Args, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    #[arg(long)]
    pub catalog: Option<String>,
    #[arg(long)]
    pub warehouse_db: Option<String>,
    #[arg(long)]
    pub scale_factor: Option<u32>,
    #[arg(long)]
    pub table_name: Option<String>,
    /// Column list, e.g. `id BIGINT NOT NULL, name STRING COMMENT 'x'`.
    #[arg(long)]
    pub column_schema: Option<String>,
    /// Constraint fragment appended after the columns. May be empty.
    #[arg(long)]
    pub constraints: Option<String>,
    /// `TBLPROPERTIES (...)` fragment. May be empty.
    #[arg(long)]
    pub table_properties: Option<String>,
    /// Directory holding `sf=<scale>/Batch*/...`.
    #[arg(long)]
    pub root_directory: Option<PathBuf>,
    /// Glob applied to the bare file name inside each batch directory.
    #[arg(long)]
    pub filename_pattern: Option<String>,
    /// Where tables are stored.
    #[arg(long)]
    pub warehouse: Option<PathBuf>,
    #[arg(long)]
    pub batch_marker: Option<String>,
    /// `variable`, or the exact number of digits after the marker.
    #[arg(long)]
    pub batch_digits: Option<DigitWidth>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionParams {
    pub ident: TableIdent,
    pub column_schema: String,
    pub constraints: String,
    pub table_properties: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadParams {
    pub ident: TableIdent,
    pub root_directory: PathBuf,
    pub scale_factor: u32,
    pub filename_pattern: String,
    pub column_schema: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageParams {
    pub root_directory: PathBuf,
    pub scale_factor: u32,
}

fn require<'a, T>(
    value: &'a Option<T>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<&'a T> {
    if value.is_none() {
        missing.push(name);
    }
    value.as_ref()
}

fn missing_error(missing: &[&str]) -> LoadError {
    LoadError::Config(format!("missing parameter(s): {}", missing.join(", ")))
}

impl JobConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| LoadError::Config(format!("job file: {}", e)))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| LoadError::io(format!("reading {}", path.display()), e))?;
        serde_yaml::from_str(&text)
            .map_err(|e| LoadError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Fields set in `flags` win over `self`.
    pub fn overlay(self, flags: JobConfig) -> JobConfig {
        JobConfig {
            catalog: flags.catalog.or(self.catalog),
            warehouse_db: flags.warehouse_db.or(self.warehouse_db),
            scale_factor: flags.scale_factor.or(self.scale_factor),
            table_name: flags.table_name.or(self.table_name),
            column_schema: flags.column_schema.or(self.column_schema),
            constraints: flags.constraints.or(self.constraints),
            table_properties: flags.table_properties.or(self.table_properties),
            root_directory: flags.root_directory.or(self.root_directory),
            filename_pattern: flags.filename_pattern.or(self.filename_pattern),
            warehouse: flags.warehouse.or(self.warehouse),
            batch_marker: flags.batch_marker.or(self.batch_marker),
            batch_digits: flags.batch_digits.or(self.batch_digits),
        }
    }

    pub fn warehouse(&self) -> PathBuf {
        self.warehouse
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WAREHOUSE))
    }

    pub fn extractor(&self) -> Result<BatchIdExtractor> {
        BatchIdExtractor::new(
            self.batch_marker.as_deref().unwrap_or(DEFAULT_MARKER),
            self.batch_digits.unwrap_or_default(),
        )
    }

    pub fn ident(&self) -> Result<TableIdent> {
        let mut missing = Vec::new();
        let parts = self.ident_parts(&mut missing);
        match parts {
            Some((c, w, s, t)) if missing.is_empty() => TableIdent::from_params(c, w, s, t),
            _ => Err(missing_error(&missing)),
        }
    }

    fn ident_parts<'a>(
        &'a self,
        missing: &mut Vec<&'static str>,
    ) -> Option<(&'a str, &'a str, u32, &'a str)> {
        let catalog = require(&self.catalog, "catalog", missing);
        let db = require(&self.warehouse_db, "warehouse_db", missing);
        let sf = require(&self.scale_factor, "scale_factor", missing);
        let table = require(&self.table_name, "table_name", missing);
        Some((catalog?.as_str(), db?.as_str(), *sf?, table?.as_str()))
    }

    /// Constraints and properties default to empty.
    pub fn provision_params(&self) -> Result<ProvisionParams> {
        let mut missing = Vec::new();
        let parts = self.ident_parts(&mut missing);
        let schema = require(&self.column_schema, "column_schema", &mut missing);
        let (Some((c, w, s, t)), Some(schema), true) = (parts, schema, missing.is_empty()) else {
            return Err(missing_error(&missing));
        };
        Ok(ProvisionParams {
            ident: TableIdent::from_params(c, w, s, t)?,
            column_schema: schema.clone(),
            constraints: self.constraints.clone().unwrap_or_default(),
            table_properties: self.table_properties.clone().unwrap_or_default(),
        })
    }

    pub fn load_params(&self) -> Result<LoadParams> {
        let mut missing = Vec::new();
        let parts = self.ident_parts(&mut missing);
        let root = require(&self.root_directory, "root_directory", &mut missing);
        let pattern = require(&self.filename_pattern, "filename_pattern", &mut missing);
        let schema = require(&self.column_schema, "column_schema", &mut missing);
        let (Some((c, w, s, t)), Some(root), Some(pattern), Some(schema), true) =
            (parts, root, pattern, schema, missing.is_empty())
        else {
            return Err(missing_error(&missing));
        };
        Ok(LoadParams {
            ident: TableIdent::from_params(c, w, s, t)?,
            root_directory: root.clone(),
            scale_factor: s,
            filename_pattern: pattern.clone(),
            column_schema: schema.clone(),
        })
    }

    pub fn stage_params(&self) -> Result<StageParams> {
        let mut missing = Vec::new();
        let root = require(&self.root_directory, "root_directory", &mut missing);
        let sf = require(&self.scale_factor, "scale_factor", &mut missing);
        let (Some(root), Some(sf)) = (root, sf) else {
            return Err(missing_error(&missing));
        };
        Ok(StageParams {
            root_directory: root.clone(),
            scale_factor: *sf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
catalog: tpcdi
warehouse_db: tpcdi_wh
scale_factor: 10
table_name: DimBroker
column_schema: "sk_brokerid BIGINT, name STRING"
root_directory: /data/tpcdi
filename_pattern: "HR*"
batch_digits: 1
"#;

    #[test]
    fn yaml_job_resolves_both_parameter_sets() -> anyhow::Result<()> {
        let cfg = JobConfig::from_yaml_str(JOB)?;
        let p = cfg.provision_params()?;
        assert_eq!(p.ident.to_string(), "tpcdi.tpcdi_wh_10.DimBroker");
        assert_eq!(p.constraints, "");

        let l = cfg.load_params()?;
        assert_eq!(l.ident, p.ident);
        assert_eq!(l.root_directory, PathBuf::from("/data/tpcdi"));
        assert_eq!(cfg.extractor()?.width(), DigitWidth::Exact(1));
        assert_eq!(cfg.warehouse(), PathBuf::from(DEFAULT_WAREHOUSE));
        Ok(())
    }

    #[test]
    fn flags_override_file_values() -> anyhow::Result<()> {
        let file = JobConfig::from_yaml_str(JOB)?;
        let flags = JobConfig {
            scale_factor: Some(3),
            ..Default::default()
        };
        let merged = file.overlay(flags);
        assert_eq!(merged.ident()?.database, "tpcdi_wh_3");
        assert_eq!(merged.table_name.as_deref(), Some("DimBroker"));
        Ok(())
    }

    #[test]
    fn every_missing_name_is_reported() {
        let cfg = JobConfig {
            catalog: Some("tpcdi".into()),
            ..Default::default()
        };
        let err = cfg.load_params().unwrap_err().to_string();
        for name in [
            "warehouse_db",
            "scale_factor",
            "table_name",
            "root_directory",
            "filename_pattern",
            "column_schema",
        ] {
            assert!(err.contains(name), "{} not in {}", name, err);
        }
        assert!(!err.contains("catalog"));
    }

    #[test]
    fn staging_needs_root_and_scale_factor_only() -> anyhow::Result<()> {
        let err = JobConfig::default().stage_params().unwrap_err().to_string();
        assert!(err.contains("root_directory") && err.contains("scale_factor"));
        assert!(!err.contains("catalog"));

        let p = JobConfig::from_yaml_str("root_directory: /raw\nscale_factor: 5\n")?.stage_params()?;
        assert_eq!(p.root_directory, PathBuf::from("/raw"));
        assert_eq!(p.scale_factor, 5);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            JobConfig::from_yaml_str("catalog: x\ncolour: blue\n"),
            Err(LoadError::Config(_))
        ));
    }
}
