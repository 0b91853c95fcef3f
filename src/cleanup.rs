use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("data directory does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("the following directories do not exist: {}", .0.join(", "))]
    MissingTargets(Vec<String>),

    #[error("refusing to clear {0}: path escapes the data directory")]
    OutsideRoot(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One file that was (or, in a dry run, would be) deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedFile {
    /// Relative to the data root
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed: Vec<RemovedFile>,
}

impl CleanupSummary {
    pub fn files(&self) -> usize {
        self.removed.len()
    }

    pub fn bytes(&self) -> u64 {
        self.removed.iter().map(|f| f.bytes).sum()
    }
}

/// Deletes every file under `root`, or only under the given
/// subdirectories of it, leaving the directory tree in place.
///
/// CONTRACT:
/// - All targets are validated before anything is deleted.
/// - `dry_run` reports the same files but removes nothing.
/// - Symlinks are removed as files and never followed.
pub fn clear_files(
    root: &Path,
    targets: &[String],
    dry_run: bool,
) -> Result<CleanupSummary, CleanupError> {
    if !root.is_dir() {
        return Err(CleanupError::MissingRoot(root.to_path_buf()));
    }

    let mut starts = Vec::new();
    if targets.is_empty() {
        starts.push(root.to_path_buf());
    } else {
        let mut missing = Vec::new();
        for target in targets {
            let rel = Path::new(target);
            if rel.is_absolute()
                || rel
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(CleanupError::OutsideRoot(target.clone()));
            }
            let path = root.join(rel);
            if path.exists() {
                starts.push(path);
            } else {
                missing.push(target.clone());
            }
        }
        if !missing.is_empty() {
            return Err(CleanupError::MissingTargets(missing));
        }
    }

    let mut summary = CleanupSummary::default();
    for start in starts {
        clear_tree(root, &start, dry_run, &mut summary)?;
    }
    summary.removed.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(summary)
}

fn clear_tree(
    root: &Path,
    start: &Path,
    dry_run: bool,
    summary: &mut CleanupSummary,
) -> Result<(), CleanupError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CleanupError::Io { path, source }
    };

    let mut stack = vec![start.to_path_buf()];
    while let Some(path) = stack.pop() {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => return Err(CleanupError::Io { path, source }),
        };

        if meta.is_dir() {
            for entry in fs::read_dir(&path).map_err(io_err(&path))? {
                stack.push(entry.map_err(io_err(&path))?.path());
            }
            continue;
        }

        if !dry_run {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(CleanupError::Io { path, source }),
            }
        }

        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        summary.removed.push(RemovedFile {
            path: rel,
            bytes: meta.len(),
        });
    }
    Ok(())
}
