// src/load/source.rs

use glob::{glob, Pattern};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Directory holding one scale factor's batches: `<root>/sf=<scale>`.
pub fn scale_factor_dir(root: &Path, scale_factor: u32) -> PathBuf {
    root.join(format!("sf={}", scale_factor))
}

/// Glob over every file directly inside a batch directory.
pub fn source_glob(root: &Path, scale_factor: u32, marker: &str) -> String {
    format!(
        "{}/{}*/*",
        Pattern::escape(&scale_factor_dir(root, scale_factor).to_string_lossy()),
        Pattern::escape(marker)
    )
}

/// `.DS_Store`, `_SUCCESS`, `_committed_*` and the like.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Every regular file under `<root>/sf=<scale>/<marker>*/` whose bare file
/// name matches `filename_pattern`, sorted by path. Names starting with `.`
/// or `_` are never data.
///
/// Nothing matching (including a missing root) is a `PathResolution` error.
pub fn resolve_source_files(
    root: &Path,
    scale_factor: u32,
    marker: &str,
    filename_pattern: &str,
    table: &str,
) -> Result<Vec<PathBuf>> {
    let name_filter = Pattern::new(filename_pattern).map_err(|e| {
        LoadError::Config(format!(
            "filename pattern `{}` is not a valid glob: {}",
            filename_pattern, e
        ))
    })?;
    let pattern = source_glob(root, scale_factor, marker);
    debug!(%pattern, filter = filename_pattern, "resolving source files");

    let entries = glob(&pattern)
        .map_err(|e| LoadError::Config(format!("source glob `{}`: {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let context = format!("reading {}", e.path().display());
            LoadError::io(context, e.into_error())
        })?;
        if !path.is_file() {
            continue;
        }
        let matched = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| !is_hidden(n) && name_filter.matches(n));
        if matched {
            files.push(path);
        } else {
            debug!(path = %path.display(), "skipping");
        }
    }

    if files.is_empty() {
        return Err(LoadError::PathResolution {
            table: table.to_string(),
            pattern: format!("{} (file name `{}`)", pattern, filename_pattern),
        });
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(p: &Path) {
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "x").unwrap();
    }

    #[test]
    fn filters_on_bare_file_name_inside_batch_dirs() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let sf = dir.path().join("sf=5");
        touch(&sf.join("Batch1/a.csv"));
        touch(&sf.join("Batch1/b.csv"));
        touch(&sf.join("Batch2/a.csv"));
        touch(&sf.join("Batch2/nested/a.csv"));
        touch(&sf.join("Other/a.csv"));
        touch(&dir.path().join("sf=6/Batch1/a.csv"));
        fs::create_dir_all(sf.join("Batch3/a.dir"))?;

        let files = resolve_source_files(dir.path(), 5, "Batch", "a*", "t")?;
        assert_eq!(files, vec![sf.join("Batch1/a.csv"), sf.join("Batch2/a.csv")]);
        Ok(())
    }

    #[test]
    fn hidden_and_marker_files_are_skipped() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let batch = dir.path().join("sf=1/Batch1");
        touch(&batch.join(".DS_Store"));
        touch(&batch.join("_SUCCESS"));
        touch(&batch.join("a.txt"));

        let files = resolve_source_files(dir.path(), 1, "Batch", "*", "t")?;
        assert_eq!(files, vec![batch.join("a.txt")]);
        Ok(())
    }

    #[test]
    fn missing_root_is_path_resolution_error() {
        let dir = tempdir().unwrap();
        let err =
            resolve_source_files(&dir.path().join("nope"), 1, "Batch", "*", "c.d.t").unwrap_err();
        assert!(matches!(err, LoadError::PathResolution { ref table, .. } if table == "c.d.t"));
    }

    #[test]
    fn bad_filename_pattern_is_config_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            resolve_source_files(dir.path(), 1, "Batch", "[", "t"),
            Err(LoadError::Config(_))
        ));
    }
}
