// src/stage.rs

use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{LoadError, Result};
use crate::load::scale_factor_dir;

#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Delete an existing target tree instead of skipping.
    pub overwrite: bool,
    /// Copy workers; `None` uses one per CPU.
    pub threads: Option<usize>,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub target: PathBuf,
    /// Target already held files and `overwrite` was off.
    pub skipped: bool,
    pub total: usize,
    pub copied: usize,
    pub failed: usize,
}

/// True when `dir` exists and holds at least one file at any depth.
pub fn has_files(dir: &Path) -> bool {
    dir.is_dir()
        && WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
}

fn walk_err(e: walkdir::Error) -> LoadError {
    let context = format!(
        "walking {}",
        e.path().map(|p| p.display().to_string()).unwrap_or_default()
    );
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
    LoadError::io(context, source)
}

/// Copy a generated `sf=<scale>` tree from `source` to `<root>/sf=<scale>`.
///
/// Individual copy failures are logged and counted, not fatal.
#[instrument(level = "info", skip(opts), fields(source = %source.display(), root = %root.display()))]
pub fn stage_raw_files(
    source: &Path,
    root: &Path,
    scale_factor: u32,
    opts: &StageOptions,
) -> Result<StageReport> {
    let start = Instant::now();
    let target = scale_factor_dir(root, scale_factor);
    let mut report = StageReport {
        target: target.clone(),
        ..Default::default()
    };

    if has_files(&target) {
        if !opts.overwrite {
            info!(target = %target.display(), "raw files already staged for this scale factor; skipping");
            report.skipped = true;
            return Ok(report);
        }
        info!(target = %target.display(), "overwrite set; deleting existing target");
        fs::remove_dir_all(&target)
            .map_err(|e| LoadError::io(format!("removing {}", target.display()), e))?;
    }

    if !source.is_dir() {
        return Err(LoadError::Config(format!(
            "staging source {} is not a directory",
            source.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(walk_err)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| LoadError::Config(format!("{} escapes source", entry.path().display())))?
            .to_path_buf();
        let dest = target.join(&rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .map_err(|e| LoadError::io(format!("creating {}", dest.display()), e))?;
        } else if entry.file_type().is_file() {
            files.push((entry.into_path(), dest));
        }
    }
    fs::create_dir_all(&target)
        .map_err(|e| LoadError::io(format!("creating {}", target.display()), e))?;

    report.total = files.len();
    if files.is_empty() {
        warn!(source = %source.display(), "no files found to stage");
        return Ok(report);
    }

    let threads = opts.threads.unwrap_or_else(num_cpus::get).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| LoadError::Config(format!("building copy pool: {}", e)))?;
    info!(files = files.len(), threads, "copying raw files");

    let done = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let total = files.len();
    pool.install(|| {
        files.par_iter().for_each(|(from, to)| {
            match fs::copy(from, to) {
                Ok(_) => {}
                Err(e) => {
                    error!(from = %from.display(), to = %to.display(), error = %e, "copy failed");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 10 == 0 || n == total {
                info!("progress: {}/{} files", n, total);
            }
        });
    });

    report.failed = failed.into_inner();
    report.copied = total - report.failed;
    info!(
        copied = report.copied,
        failed = report.failed,
        elapsed = ?start.elapsed(),
        "staging complete"
    );
    Ok(report)
}
