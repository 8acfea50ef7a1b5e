// src/schema/parse.rs

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;

use super::types::{Column, ColumnType, BATCH_ID_COLUMN};
use crate::error::{LoadError, Result};

/// `name TYPE[(p[,s])] [NOT NULL] [COMMENT '...']`
static COLUMN_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^(`[^`]+`|[A-Za-z_][A-Za-z0-9_]*)\s+([A-Za-z]+)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?(\s+NOT\s+NULL)?(?:\s+COMMENT\s+'((?:[^'\\]|\\.|'')*)')?$",
    )
    .expect("column definition regex is valid")
});

/// Split `s` on commas that sit outside parentheses, quotes and backticks.
///
/// Pieces are trimmed; empty pieces are kept so callers can decide whether
/// they are an error.
pub fn split_top_level(s: &str) -> std::result::Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' && q == '\'' {
                chars.next();
            } else if c == q {
                if q == '\'' && matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '\'' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced `)` at offset {}", i))?;
            }
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if depth != 0 {
        return Err("unbalanced `(`".to_string());
    }
    parts.push(s[start..].trim());
    Ok(parts)
}

/// Strip back-quotes from an identifier.
pub(crate) fn unquote_ident(raw: &str) -> String {
    raw.trim()
        .strip_prefix('`')
        .and_then(|r| r.strip_suffix('`'))
        .unwrap_or(raw.trim())
        .to_string()
}

fn unescape_comment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_type(caps: &Captures<'_>) -> std::result::Result<ColumnType, String> {
    let word = caps[2].to_ascii_uppercase();
    let arg = |i: usize| -> std::result::Result<Option<u32>, String> {
        caps.get(i)
            .map(|m| {
                m.as_str()
                    .parse::<u32>()
                    .map_err(|_| format!("type argument `{}` is out of range", m.as_str()))
            })
            .transpose()
    };
    let (first, second) = (arg(3)?, arg(4)?);
    let no_args = |ty: ColumnType| {
        if first.is_some() {
            Err(format!("type {} takes no arguments", word))
        } else {
            Ok(ty)
        }
    };

    match word.as_str() {
        "STRING" => no_args(ColumnType::String),
        "CHAR" | "VARCHAR" => match (first, second) {
            (Some(length), None) if length > 0 => Ok(if word == "CHAR" {
                ColumnType::Char { length }
            } else {
                ColumnType::Varchar { length }
            }),
            _ => Err(format!("{} needs a single positive length", word)),
        },
        "TINYINT" | "BYTE" => no_args(ColumnType::TinyInt),
        "SMALLINT" | "SHORT" => no_args(ColumnType::SmallInt),
        "INT" | "INTEGER" => no_args(ColumnType::Int),
        "BIGINT" | "LONG" => no_args(ColumnType::BigInt),
        "FLOAT" | "REAL" => no_args(ColumnType::Float),
        "DOUBLE" => no_args(ColumnType::Double),
        "DECIMAL" | "DEC" | "NUMERIC" => {
            let precision = first.unwrap_or(10);
            let scale = second.unwrap_or(0);
            if !(1..=38).contains(&precision) || scale > precision {
                return Err(format!(
                    "DECIMAL({},{}) is out of range (precision 1..=38, scale <= precision)",
                    precision, scale
                ));
            }
            Ok(ColumnType::Decimal {
                precision: precision as u8,
                scale: scale as i8,
            })
        }
        "BOOLEAN" | "BOOL" => no_args(ColumnType::Boolean),
        "DATE" => no_args(ColumnType::Date),
        "TIMESTAMP" => no_args(ColumnType::Timestamp),
        other => Err(format!("unsupported column type `{}`", other)),
    }
}

/// Parse a declaration like `id BIGINT NOT NULL COMMENT 'key', name STRING`
/// into typed columns.
///
/// `table` only feeds error messages.
pub fn parse_columns(decl: &str, table: &str) -> Result<Vec<Column>> {
    let pieces = split_top_level(decl).map_err(|e| LoadError::schema(table, e))?;
    if pieces.iter().all(|p| p.is_empty()) {
        return Err(LoadError::schema(table, "column schema is empty"));
    }

    let mut seen = HashSet::new();
    let mut cols = Vec::with_capacity(pieces.len());
    for (idx, piece) in pieces.into_iter().enumerate() {
        if piece.is_empty() {
            return Err(LoadError::schema(
                table,
                format!("empty column definition at position {}", idx + 1),
            ));
        }
        let caps = COLUMN_DEF.captures(piece).ok_or_else(|| {
            LoadError::schema(table, format!("cannot parse column definition `{}`", piece))
        })?;

        let name = unquote_ident(&caps[1]);
        if name.eq_ignore_ascii_case(BATCH_ID_COLUMN) {
            return Err(LoadError::schema(
                table,
                format!("`{}` is reserved for the batch column", BATCH_ID_COLUMN),
            ));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(LoadError::schema(
                table,
                format!("duplicate column `{}`", name),
            ));
        }
        let ty = parse_type(&caps)
            .map_err(|e| LoadError::schema(table, format!("column `{}`: {}", name, e)))?;

        cols.push(Column {
            name,
            ty,
            nullable: caps.get(5).is_none(),
            comment: caps.get(6).map(|m| unescape_comment(m.as_str())),
        });
    }
    Ok(cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_declaration() {
        let cols = parse_columns(
            "accountid BIGINT NOT NULL COMMENT 'Customer account identifier', \
             brokerid BIGINT, accountdesc STRING COMMENT 'Name of customer''s account', \
             balance DECIMAL(15,2), opened DATE, seen TIMESTAMP, flag char(1)",
            "t",
        )
        .unwrap();

        assert_eq!(cols.len(), 7);
        assert_eq!(cols[0].name, "accountid");
        assert_eq!(cols[0].ty, ColumnType::BigInt);
        assert!(!cols[0].nullable);
        assert_eq!(
            cols[0].comment.as_deref(),
            Some("Customer account identifier")
        );
        assert!(cols[1].nullable);
        assert_eq!(
            cols[2].comment.as_deref(),
            Some("Name of customer's account")
        );
        assert_eq!(
            cols[3].ty,
            ColumnType::Decimal {
                precision: 15,
                scale: 2
            }
        );
        assert_eq!(cols[4].ty, ColumnType::Date);
        assert_eq!(cols[5].ty, ColumnType::Timestamp);
        assert_eq!(cols[6].ty, ColumnType::Char { length: 1 });
    }

    #[test]
    fn comma_inside_comment_does_not_split() {
        let cols = parse_columns("a INT COMMENT 'x, y', `b c` STRING", "t").unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].comment.as_deref(), Some("x, y"));
        assert_eq!(cols[1].name, "b c");
    }

    #[test]
    fn malformed_declarations_are_schema_errors() {
        for bad in [
            "",
            "a INT,,b INT",
            "a",
            "a WIDGET",
            "a INT, A STRING",
            "a DECIMAL(40,2)",
            "a VARCHAR",
            "a INT(3)",
            "a INT COMMENT 'open",
            "a DECIMAL(10,2",
            "batchid INT",
        ] {
            let err = parse_columns(bad, "t").unwrap_err();
            assert!(matches!(err, LoadError::Schema { .. }), "{}: {:?}", bad, err);
        }
    }

    #[test]
    fn decimal_defaults_match_sql() {
        let cols = parse_columns("x NUMERIC", "t").unwrap();
        assert_eq!(
            cols[0].ty,
            ColumnType::Decimal {
                precision: 10,
                scale: 0
            }
        );
    }
}
