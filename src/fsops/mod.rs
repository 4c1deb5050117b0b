//! Directory removal and merge-copy over a swappable filesystem.
//!
//! Both walks use an explicit worklist instead of recursion, so the order in
//! which entries are touched is fixed: for removal, subdirectories are handled
//! before files and a directory is removed only after its contents.

mod copy;
#[cfg(test)]
pub(crate) mod memory;
mod remove;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use copy::{copy_directory_merge, CopyReport};
pub use remove::{remove_directory, remove_directory_contents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Anything else, including a symlink whose target is gone.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    /// Kind of the entry, following symlinks.
    pub kind: EntryKind,
    pub is_symlink: bool,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// The filesystem calls the updater needs.
pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Immediate children of `path`, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Removes an empty directory.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Creates `to` as a link with the same target as the link `from`.
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// The real disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            let is_symlink = entry.file_type()?.is_symlink();
            let kind = match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => EntryKind::Dir,
                Ok(meta) if meta.is_file() => EntryKind::File,
                _ => EntryKind::Other,
            };

            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                kind,
                is_symlink,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            // Directory symlinks on Windows are removed as directories.
            Err(e) if cfg!(windows) && path.is_symlink() => fs::remove_dir(path).map_err(|_| e),
            other => other,
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        let target = fs::read_link(from)?;
        if to.is_symlink() || to.is_file() {
            self.remove_file(to)?;
        }

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, to)
        }
        #[cfg(windows)]
        {
            if from.is_dir() {
                std::os::windows::fs::symlink_dir(target, to)
            } else {
                std::os::windows::fs::symlink_file(target, to)
            }
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_dir_sorted_with_kinds() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let entries = StdFileSystem.read_dir(dir.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(names, vec![("a", EntryKind::Dir), ("b.txt", EntryKind::File)]);
        assert!(entries.iter().all(|e| !e.is_symlink));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_dir_flags_symlinks() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("broken")).unwrap();

        let entries = StdFileSystem.read_dir(dir.path()).unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        assert!(link.is_symlink);
        assert_eq!(link.kind, EntryKind::Dir);

        let broken = entries.iter().find(|e| e.name == "broken").unwrap();
        assert_eq!(broken.kind, EntryKind::Other);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_symlink_keeps_relative_target() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("libfeeds.so.2", dir.path().join("libfeeds.so")).unwrap();
        fs::write(dir.path().join("copy.so"), "old library").unwrap();

        StdFileSystem
            .copy_symlink(&dir.path().join("libfeeds.so"), &dir.path().join("copy.so"))
            .unwrap();

        assert_eq!(
            fs::read_link(dir.path().join("copy.so")).unwrap(),
            Path::new("libfeeds.so.2")
        );
    }
}
