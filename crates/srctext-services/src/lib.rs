//! Orchestration layer: discovery, per-file pipeline and batch reports.
//! The CLI only talks to this crate.

use std::path::{Path, PathBuf};

use serde::Serialize;
use srctext_core::Rules;
use walkdir::{DirEntry, WalkDir};

pub mod propagate;
pub mod render;
pub mod transform;

pub use propagate::{marker_text, propagate, PropagationReport};
pub use render::{render, restore_escapes, XML_DECLARATION};
pub use srctext_core::Result;
pub use transform::{transform_bytes, transform_file, FileReport, Transformed, WriteOptions};

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub category: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub changed: usize,
    pub applied: usize,
    pub files: Vec<FileReport>,
    pub failed: Vec<FailedFile>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// All `.xml` files under `root`, sorted, skipping anything below a
/// dot-directory.
pub fn discover_xml_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) || e.file_type().is_file());
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(event = "walk_error", error = %e);
                continue;
            }
        };
        let p = entry.path();
        if entry.file_type().is_file() && is_xml(p) {
            files.push(p.to_path_buf());
        }
    }
    files.sort();
    files
}

/// Transform every path; a failing file is recorded and the rest still run.
pub fn apply_files<I>(paths: I, rules: &Rules, opts: WriteOptions) -> BatchSummary
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut summary = BatchSummary::default();
    for path in paths {
        summary.processed += 1;
        match transform_file(&path, rules, opts) {
            Ok(rep) => {
                if rep.changed {
                    summary.changed += 1;
                }
                summary.applied += rep.report.applied;
                summary.files.push(rep);
            }
            Err(e) => {
                tracing::warn!(event = "file_failed", path = %path.display(), error = %e);
                summary.failed.push(FailedFile {
                    path,
                    category: e.category(),
                    error: e.to_string(),
                });
            }
        }
    }
    summary
}

/// Discover and transform all localization files under `root`.
pub fn apply_tree(root: &Path, rules: &Rules, opts: WriteOptions) -> Result<BatchSummary> {
    if !root.is_dir() {
        color_eyre::eyre::bail!("root is not a directory: {}", root.display());
    }
    let files = discover_xml_files(root);
    tracing::info!(event = "discovered", root = %root.display(), files = files.len());
    Ok(apply_files(files, rules, opts))
}
