// src/load/batch_id.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::Path,
    str::FromStr,
};

use crate::error::{LoadError, Result};

/// Default directory marker: `Batch1`, `Batch2`, ...
pub const DEFAULT_MARKER: &str = "Batch";

/// How many digits follow the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "DigitsRepr", into = "DigitsRepr")]
pub enum DigitWidth {
    /// The whole segment is marker + digits; any number of digits.
    #[default]
    Variable,
    /// Exactly `n` digits right after the marker; anything after is ignored.
    /// `Exact(1)` turns `Batch12` into 1.
    Exact(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DigitsRepr {
    Count(usize),
    Word(String),
}

impl TryFrom<DigitsRepr> for DigitWidth {
    type Error = String;

    fn try_from(r: DigitsRepr) -> std::result::Result<Self, String> {
        match r {
            DigitsRepr::Count(0) => Err("batch digit width must be at least 1".into()),
            DigitsRepr::Count(n) => Ok(DigitWidth::Exact(n)),
            DigitsRepr::Word(w) => w.parse(),
        }
    }
}

impl From<DigitWidth> for DigitsRepr {
    fn from(w: DigitWidth) -> Self {
        match w {
            DigitWidth::Variable => DigitsRepr::Word("variable".into()),
            DigitWidth::Exact(n) => DigitsRepr::Count(n),
        }
    }
}

impl FromStr for DigitWidth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("variable") {
            return Ok(DigitWidth::Variable);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(DigitWidth::Exact(n)),
            _ => Err(format!(
                "batch digit width must be `variable` or a positive integer, got `{}`",
                s
            )),
        }
    }
}

impl fmt::Display for DigitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitWidth::Variable => f.write_str("variable"),
            DigitWidth::Exact(n) => write!(f, "{}", n),
        }
    }
}

/// Reads the batch number out of the name of a batch directory,
/// `^<marker>(<digits>)`.
#[derive(Debug, Clone)]
pub struct BatchIdExtractor {
    marker: String,
    width: DigitWidth,
    re: Regex,
}

impl BatchIdExtractor {
    pub fn new(marker: &str, width: DigitWidth) -> Result<Self> {
        if marker.is_empty() || marker.contains(['/', '\\']) {
            return Err(LoadError::Config(format!(
                "batch marker `{}` must be a non-empty directory-name prefix",
                marker
            )));
        }
        let pattern = match width {
            DigitWidth::Variable => format!(r"^{}(\d+)$", regex::escape(marker)),
            DigitWidth::Exact(0) => {
                return Err(LoadError::Config(
                    "batch digit width must be at least 1".into(),
                ))
            }
            DigitWidth::Exact(n) => format!(r"^{}(\d{{{}}})", regex::escape(marker), n),
        };
        let re = Regex::new(&pattern)
            .map_err(|e| LoadError::Config(format!("batch marker pattern: {}", e)))?;
        Ok(Self {
            marker: marker.to_string(),
            width,
            re,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn width(&self) -> DigitWidth {
        self.width
    }

    /// Batch number of the directory directly containing `path`.
    ///
    /// Only that one component is examined; directories further up, such as
    /// the load root, never contribute.
    pub fn extract(&self, path: &Path) -> std::result::Result<i32, String> {
        let dir = path
            .parent()
            .and_then(Path::file_name)
            .ok_or_else(|| "file has no parent directory".to_string())?;
        let dir = dir
            .to_str()
            .ok_or_else(|| format!("directory name {:?} is not valid UTF-8", dir))?;
        self.extract_dir_name(dir)
    }

    /// Batch number encoded in a batch directory name.
    pub fn extract_dir_name(&self, name: &str) -> std::result::Result<i32, String> {
        let Some(caps) = self.re.captures(name) else {
            return Err(match self.width {
                DigitWidth::Variable => {
                    format!("`{}` is not of the form {}<digits>", name, self.marker)
                }
                DigitWidth::Exact(n) => format!(
                    "`{}` does not start with {} followed by {} digit(s)",
                    name, self.marker, n
                ),
            });
        };
        caps[1]
            .parse::<i32>()
            .map_err(|_| format!("batch number `{}` is out of range", &caps[1]))
    }
}

impl Default for BatchIdExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DigitWidth::Variable).expect("default batch marker is valid")
    }
}
