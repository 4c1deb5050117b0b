use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};
use crate::progress::ProgressSink;

use super::FileSystem;

/// What a merge-copy managed to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub failed: Vec<PathBuf>,
}

impl CopyReport {
    pub fn attempted(&self) -> usize {
        self.copied + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Mirror `source` into `destination`, overwriting files that already exist.
///
/// Every file is logged to `sink`. A file that cannot be replaced is recorded
/// in the report and the walk carries on, so this only fails when `source`
/// itself is missing. Symlinks are recreated, never descended into.
pub fn copy_directory_merge(
    fs: &dyn FileSystem,
    sink: &mut dyn ProgressSink,
    source: &Path,
    destination: &Path,
) -> Result<CopyReport> {
    if !fs.is_dir(source) {
        return Err(UpdateError::CopySourceMissing(source.to_path_buf()));
    }

    let mut report = CopyReport::default();
    if let Err(e) = fs.create_dir_all(destination) {
        tracing::debug!(dir = %destination.display(), error = %e, "cannot create destination");
    }

    let mut work = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((src_dir, dst_dir)) = work.pop() {
        let entries = match fs.read_dir(&src_dir) {
            Ok(entries) => entries,
            Err(e) => {
                sink.line(&format!(
                    "Failed to read directory {}: {}",
                    src_dir.display(),
                    e
                ));
                report.failed.push(src_dir);
                continue;
            }
        };

        let mut subdirs = Vec::new();
        for entry in entries {
            let target = dst_dir.join(&entry.name);

            if entry.is_symlink {
                match fs.copy_symlink(&entry.path, &target) {
                    Ok(()) => {
                        let shown = entry.path.strip_prefix(source).unwrap_or(&entry.path);
                        sink.line(&format!("Linked {}", shown.display()));
                        report.copied += 1;
                    }
                    Err(e) => {
                        sink.line(&format!("Failed to link {}: {}", entry.path.display(), e));
                        report.failed.push(entry.path);
                    }
                }
                continue;
            }

            if entry.is_dir() {
                if let Err(e) = fs.create_dir_all(&target) {
                    sink.line(&format!("Failed to create folder {}: {}", target.display(), e));
                }
                subdirs.push((entry.path, target));
                continue;
            }

            if fs.exists(&target) {
                if let Err(e) = fs.remove_file(&target) {
                    sink.line(&format!("Failed to remove file {}: {}", target.display(), e));
                    report.failed.push(entry.path);
                    continue;
                }
            }

            match fs.copy_file(&entry.path, &target) {
                Ok(()) => {
                    let shown = entry.path.strip_prefix(source).unwrap_or(&entry.path);
                    sink.line(&format!("Copied file {}", shown.display()));
                    report.copied += 1;
                }
                Err(e) => {
                    sink.line(&format!("Failed to copy file {}: {}", entry.path.display(), e));
                    report.failed.push(entry.path);
                }
            }
        }

        work.extend(subdirs.into_iter().rev());
    }

    Ok(report)
}
