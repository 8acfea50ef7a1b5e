// src/schema/constraints.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::parse::{split_top_level, unquote_ident};
use super::types::Column;
use crate::error::{LoadError, Result};

static PRIMARY_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(?:CONSTRAINT\s+(`[^`]+`|\w+)\s+)?PRIMARY\s+KEY\s*\(([^)]*)\)(?:\s+RELY)?$")
        .expect("primary key regex is valid")
});

static FOREIGN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^(?:CONSTRAINT\s+(`[^`]+`|\w+)\s+)?FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+([\w.`]+)\s*(?:\(([^)]*)\))?$",
    )
    .expect("foreign key regex is valid")
});

/// Table-level constraint carried by a definition.
///
/// Primary-key columns are stored as NOT NULL; foreign keys are
/// informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<String>,
    },
    ForeignKey {
        name: Option<String>,
        columns: Vec<String>,
        references: String,
        ref_columns: Vec<String>,
    },
}

impl Constraint {
    pub fn to_sql(&self) -> String {
        let named = |name: &Option<String>| {
            name.as_ref()
                .map(|n| format!("CONSTRAINT {} ", n))
                .unwrap_or_default()
        };
        match self {
            Constraint::PrimaryKey { name, columns } => {
                format!("{}PRIMARY KEY ({})", named(name), columns.join(", "))
            }
            Constraint::ForeignKey {
                name,
                columns,
                references,
                ref_columns,
            } => {
                let mut out = format!(
                    "{}FOREIGN KEY ({}) REFERENCES {}",
                    named(name),
                    columns.join(", "),
                    references
                );
                if !ref_columns.is_empty() {
                    out.push_str(&format!("({})", ref_columns.join(", ")));
                }
                out
            }
        }
    }
}

fn column_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(unquote_ident)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Resolve each listed column against the schema, returning canonical names.
fn resolve_columns(listed: Vec<String>, cols: &[Column], table: &str) -> Result<Vec<String>> {
    if listed.is_empty() {
        return Err(LoadError::schema(table, "constraint lists no columns"));
    }
    listed
        .into_iter()
        .map(|c| {
            cols.iter()
                .find(|col| col.name.eq_ignore_ascii_case(&c))
                .map(|col| col.name.clone())
                .ok_or_else(|| {
                    LoadError::schema(table, format!("constraint references unknown column `{}`", c))
                })
        })
        .collect()
}

/// Parse a trailing constraints clause against the declared columns.
///
/// An empty clause yields no constraints; a leading comma is ignored.
pub fn parse_constraints(raw: &str, cols: &[Column], table: &str) -> Result<Vec<Constraint>> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(',').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let pieces = split_top_level(trimmed).map_err(|e| LoadError::schema(table, e))?;
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if let Some(caps) = PRIMARY_KEY.captures(piece) {
            if out
                .iter()
                .any(|c| matches!(c, Constraint::PrimaryKey { .. }))
            {
                return Err(LoadError::schema(table, "more than one PRIMARY KEY"));
            }
            out.push(Constraint::PrimaryKey {
                name: caps.get(1).map(|m| unquote_ident(m.as_str())),
                columns: resolve_columns(column_list(&caps[2]), cols, table)?,
            });
        } else if let Some(caps) = FOREIGN_KEY.captures(piece) {
            let columns = resolve_columns(column_list(&caps[2]), cols, table)?;
            let ref_columns = caps.get(4).map(|m| column_list(m.as_str())).unwrap_or_default();
            if !ref_columns.is_empty() && ref_columns.len() != columns.len() {
                return Err(LoadError::schema(
                    table,
                    format!(
                        "foreign key has {} columns but references {}",
                        columns.len(),
                        ref_columns.len()
                    ),
                ));
            }
            out.push(Constraint::ForeignKey {
                name: caps.get(1).map(|m| unquote_ident(m.as_str())),
                columns,
                references: caps[3].replace('`', ""),
                ref_columns,
            });
        } else {
            return Err(LoadError::schema(
                table,
                format!("cannot parse constraint `{}`", piece),
            ));
        }
    }
    Ok(out)
}
