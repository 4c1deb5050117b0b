use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// Number of entries in a valid invocation, the updater's own path included.
pub const EXPECTED_ARGUMENTS: usize = 5;

/// Decoded invocation of the updater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateArguments {
    pub updater_executable_path: PathBuf,
    pub current_version: String,
    pub next_version: String,
    pub target_executable_path: PathBuf,
    pub install_root_path: PathBuf,
    pub update_archive_path: PathBuf,
    pub archive_parent_path: PathBuf,
    pub extraction_temp_path: PathBuf,
}

impl UpdateArguments {
    /// Parse `<updater> <current_version> <next_version> <target_executable> <update_archive>`.
    ///
    /// The extraction temp path is `<archive parent>/<app_name>`.
    pub fn parse(raw: &[String], app_name: &str) -> Result<Self> {
        if raw.len() != EXPECTED_ARGUMENTS {
            return Err(UpdateError::InsufficientArguments { found: raw.len() });
        }

        let updater_executable_path = native_path(&raw[0]);
        let target_executable_path = absolute(native_path(&raw[3]));
        let update_archive_path = absolute(native_path(&raw[4]));

        let install_root_path = parent_of(&target_executable_path, "target executable")?;
        let archive_parent_path = parent_of(&update_archive_path, "update archive")?;
        let extraction_temp_path = archive_parent_path.join(app_name);

        Ok(Self {
            updater_executable_path,
            current_version: raw[1].clone(),
            next_version: raw[2].clone(),
            target_executable_path,
            install_root_path,
            update_archive_path,
            archive_parent_path,
            extraction_temp_path,
        })
    }

    /// Bare file name of the updater executable, if it has one.
    pub fn updater_file_name(&self) -> Option<String> {
        self.updater_executable_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Where the updater moves its own executable out of the way.
    pub fn updater_backup_path(&self) -> PathBuf {
        let mut name = self.updater_executable_path.clone().into_os_string();
        name.push(".old");
        PathBuf::from(name)
    }
}

/// Convert separators to the platform's own.
fn native_path(raw: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(raw.replace('/', "\\"))
    } else {
        PathBuf::from(raw)
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn parent_of(path: &Path, name: &'static str) -> Result<PathBuf> {
    match path.parent() {
        Some(parent) if path.file_name().is_some() => Ok(parent.to_path_buf()),
        _ => Err(UpdateError::InvalidArgument {
            name,
            value: path.display().to_string(),
        }),
    }
}
