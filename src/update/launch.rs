use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Starts the updated application.
pub trait Launcher {
    /// Start `program` without tying its lifetime to the updater.
    fn spawn_detached(&self, program: &Path, working_dir: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn spawn_detached(&self, program: &Path, working_dir: &Path) -> io::Result<()> {
        let mut command = Command::new(program);
        command
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn()?;
        tracing::info!(pid = child.id(), program = %program.display(), "application started");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    pub struct RecordingLauncher {
        pub fail: bool,
        pub launched: RefCell<Vec<PathBuf>>,
    }

    impl Launcher for RecordingLauncher {
        fn spawn_detached(&self, program: &Path, _working_dir: &Path) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
            }
            self.launched.borrow_mut().push(program.to_path_buf());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_program_fails() {
        let dir = TempDir::new().unwrap();
        let result = DetachedLauncher.spawn_detached(&dir.path().join("rssguard"), dir.path());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawns_existing_program() {
        let dir = TempDir::new().unwrap();
        assert!(DetachedLauncher
            .spawn_detached(Path::new("true"), dir.path())
            .is_ok());
    }
}
