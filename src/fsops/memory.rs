use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use super::{Entry, EntryKind, FileSystem};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory tree that records every mutation.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
    failing: RefCell<HashSet<PathBuf>>,
    ops: RefCell<Vec<String>>,
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{} is locked", path.display()),
    )
}

fn missing(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.borrow_mut();
        for ancestor in Path::new(path).ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor == Path::new("/") {
                continue;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    pub fn add_file(&self, path: &str, content: &str) {
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            self.add_dir(&parent.to_string_lossy());
        }
        self.nodes
            .borrow_mut()
            .insert(path.to_path_buf(), Node::File(content.as_bytes().to_vec()));
    }

    /// Make every mutation touching `path` fail.
    pub fn fail_on(&self, path: &str) {
        self.failing.borrow_mut().insert(PathBuf::from(path));
    }

    pub fn operations(&self) -> Vec<String> {
        self.ops.borrow().clone()
    }

    pub fn read(&self, path: &str) -> Option<String> {
        match self.nodes.borrow().get(Path::new(path)) {
            Some(Node::File(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.failing.borrow().contains(path) {
            Err(denied(path))
        } else {
            Ok(())
        }
    }

    fn log(&self, op: String) {
        self.ops.borrow_mut().push(op);
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.borrow().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.borrow().get(path), Some(Node::Dir))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<Entry>> {
        if !self.is_dir(path) {
            return Err(missing(path));
        }

        Ok(self
            .nodes
            .borrow()
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, node)| Entry {
                name: p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: p.clone(),
                kind: match node {
                    Node::Dir => EntryKind::Dir,
                    Node::File(_) => EntryKind::File,
                },
                is_symlink: false,
            })
            .collect())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        if !self.is_dir(path) {
            self.log(format!("mkdir {}", path.display()));
            self.add_dir(&path.to_string_lossy());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        match self.nodes.borrow().get(path) {
            Some(Node::File(_)) => {}
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is a directory", path.display()),
                ))
            }
            None => return Err(missing(path)),
        }
        self.nodes.borrow_mut().remove(path);
        self.log(format!("rm {}", path.display()));
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.check(path)?;
        if !self.is_dir(path) {
            return Err(missing(path));
        }
        if self.nodes.borrow().keys().any(|p| p.parent() == Some(path)) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not empty", path.display()),
            ));
        }
        self.nodes.borrow_mut().remove(path);
        self.log(format!("rmdir {}", path.display()));
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(from)?;
        self.check(to)?;
        let content = match self.nodes.borrow().get(from) {
            Some(Node::File(bytes)) => bytes.clone(),
            _ => return Err(missing(from)),
        };
        match to.parent() {
            Some(parent) if self.is_dir(parent) => {}
            _ => return Err(missing(to)),
        }
        self.nodes
            .borrow_mut()
            .insert(to.to_path_buf(), Node::File(content));
        self.log(format!("cp {} {}", from.display(), to.display()));
        Ok(())
    }

    fn copy_symlink(&self, from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} is not a link", from.display()),
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(from)?;
        self.check(to)?;
        let node = self
            .nodes
            .borrow_mut()
            .remove(from)
            .ok_or_else(|| missing(from))?;
        self.nodes.borrow_mut().insert(to.to_path_buf(), node);
        self.log(format!("mv {} {}", from.display(), to.display()));
        Ok(())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        match self.nodes.borrow().get(path) {
            Some(Node::File(bytes)) => Ok(bytes.len() as u64),
            Some(Node::Dir) => Ok(0),
            None => Err(missing(path)),
        }
    }
}
