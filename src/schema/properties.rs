// src/schema/properties.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::parse::split_top_level;
use crate::error::{LoadError, Result};

pub const COMPRESSION_KEY: &str = "parquet.compression";
pub const ROW_GROUP_SIZE_KEY: &str = "parquet.max_row_group_size";

const COMPRESSIONS: &[&str] = &["snappy", "zstd", "brotli", "gzip", "lz4", "uncompressed"];

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^('(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|[\w.\-]+)\s*=\s*('(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|[\w.\-]+)$"#)
        .expect("property entry regex is valid")
});

static KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^TBLPROPERTIES\b").expect("keyword regex is valid"));

/// Storage-level options, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableProperties(BTreeMap<String, String>);

fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')));
    match inner {
        Some(s) => s.replace("\\'", "'").replace("\\\"", "\""),
        None => raw.to_string(),
    }
}

impl TableProperties {
    /// Parse `TBLPROPERTIES ('k' = 'v', ...)`, `('k'='v')` or `k=v, k2=v2`.
    pub fn parse(raw: &str, table: &str) -> Result<Self> {
        let mut body = raw.trim();
        if let Some(m) = KEYWORD.find(body) {
            body = body[m.end()..].trim();
            if !body.starts_with('(') {
                return Err(LoadError::schema(table, "TBLPROPERTIES needs a parenthesized list"));
            }
        }
        if let Some(inner) = body.strip_prefix('(') {
            body = inner
                .strip_suffix(')')
                .ok_or_else(|| LoadError::schema(table, "unterminated property list"))?
                .trim();
        }

        let mut props = BTreeMap::new();
        if body.is_empty() {
            return Ok(Self(props));
        }
        for piece in split_top_level(body).map_err(|e| LoadError::schema(table, e))? {
            let caps = ENTRY.captures(piece).ok_or_else(|| {
                LoadError::schema(table, format!("cannot parse table property `{}`", piece))
            })?;
            props.insert(unquote(&caps[1]), unquote(&caps[2]));
        }

        let parsed = Self(props);
        parsed.validate(table)?;
        Ok(parsed)
    }

    fn validate(&self, table: &str) -> Result<()> {
        if let Some(c) = self.get(COMPRESSION_KEY) {
            if !COMPRESSIONS.contains(&c.to_ascii_lowercase().as_str()) {
                return Err(LoadError::schema(
                    table,
                    format!(
                        "{} must be one of {}, got `{}`",
                        COMPRESSION_KEY,
                        COMPRESSIONS.join("|"),
                        c
                    ),
                ));
            }
        }
        if let Some(n) = self.get(ROW_GROUP_SIZE_KEY) {
            match n.parse::<usize>() {
                Ok(v) if v > 0 => {}
                _ => {
                    return Err(LoadError::schema(
                        table,
                        format!("{} must be a positive integer, got `{}`", ROW_GROUP_SIZE_KEY, n),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `TBLPROPERTIES ('k' = 'v', ...)`, or an empty string.
    pub fn to_sql(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let entries: Vec<String> = self
            .iter()
            .map(|(k, v)| format!("'{}' = '{}'", k, v.replace('\'', "\\'")))
            .collect();
        format!("TBLPROPERTIES ({})", entries.join(", "))
    }
}
