use std::path::{Path, PathBuf};

use super::FileSystem;

enum Step {
    Enter { dir: PathBuf, top: bool },
    RemoveFile(PathBuf),
    Leave(PathBuf),
}

/// Recursively delete `path` and everything below it.
///
/// Files whose bare name is in `file_exceptions` are kept at every depth.
/// Directories named in `dir_exceptions` are kept only when they sit directly
/// under `path`. A directory that still holds a kept entry is not removed,
/// which makes the result `false`. Symlinks are removed, never followed.
///
/// Returns `true` when every attempted deletion succeeded, including the case
/// where `path` is not a directory at all.
pub fn remove_directory(
    fs: &dyn FileSystem,
    path: &Path,
    file_exceptions: &[String],
    dir_exceptions: &[String],
) -> bool {
    remove_tree(fs, path, file_exceptions, dir_exceptions, false)
}

/// Like [`remove_directory`], but `path` itself is left in place.
pub fn remove_directory_contents(
    fs: &dyn FileSystem,
    path: &Path,
    file_exceptions: &[String],
    dir_exceptions: &[String],
) -> bool {
    remove_tree(fs, path, file_exceptions, dir_exceptions, true)
}

fn remove_tree(
    fs: &dyn FileSystem,
    path: &Path,
    file_exceptions: &[String],
    dir_exceptions: &[String],
    keep_root: bool,
) -> bool {
    if !fs.is_dir(path) {
        return true;
    }

    let mut result = true;
    let mut work = vec![Step::Enter {
        dir: path.to_path_buf(),
        top: true,
    }];

    while let Some(step) = work.pop() {
        match step {
            Step::Enter { dir, top } => {
                let entries = match fs.read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::debug!(dir = %dir.display(), error = %e, "cannot list directory");
                        result = false;
                        continue;
                    }
                };

                if !(top && keep_root) {
                    work.push(Step::Leave(dir));
                }

                let mut files = Vec::new();
                let mut dirs = Vec::new();
                for entry in entries {
                    if entry.is_dir() && !entry.is_symlink {
                        if !(top && dir_exceptions.contains(&entry.name)) {
                            dirs.push(entry.path);
                        }
                    } else if !file_exceptions.contains(&entry.name) {
                        files.push(entry.path);
                    }
                }

                // Popped in reverse: subdirectories first, then files.
                work.extend(files.into_iter().rev().map(Step::RemoveFile));
                work.extend(
                    dirs.into_iter()
                        .rev()
                        .map(|dir| Step::Enter { dir, top: false }),
                );
            }
            Step::RemoveFile(file) => {
                if let Err(e) = fs.remove_file(&file) {
                    tracing::debug!(file = %file.display(), error = %e, "cannot remove file");
                    result = false;
                }
            }
            Step::Leave(dir) => {
                if let Err(e) = fs.remove_dir(&dir) {
                    tracing::debug!(dir = %dir.display(), error = %e, "cannot remove directory");
                    result = false;
                }
            }
        }
    }

    result
}
