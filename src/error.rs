use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while replacing an installation.
///
/// Fatal kinds stop the update and move the orchestrator to `ExitError`.
/// The remaining kinds are reported to the operator and the update goes on.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Insufficient arguments passed ({found} of 5). Update process cannot proceed.")]
    InsufficientArguments { found: usize },

    #[error("Invalid {name} argument: '{value}'")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Update file {} does not exist or is corrupted.", .0.display())]
    UpdateFileMissing(PathBuf),

    #[error("Updater made {attempts} attempts to exit {app} and it failed. Update cannot continue.")]
    InstanceStillRunning { app: String, attempts: u32 },

    #[error("Cleanup of old temporary files in {} failed.", .0.display())]
    StaleTempCleanupFailed(PathBuf),

    #[error("Extraction failed due to errors ({reason}). Update cannot continue.")]
    ExtractionFailed { reason: String },

    #[error("Could not find root of downloaded application data (found {found} directories).")]
    UnexpectedArchiveLayout { found: usize },

    #[error("Critical error appeared during copying of application files: {} is missing.", .0.display())]
    CopySourceMissing(PathBuf),

    #[error("{failed} of {attempted} new files were not copied. The installation may be inconsistent.")]
    CopyIncomplete { failed: usize, attempted: usize },

    #[error("Full cleanup of actual installation failed. Some files from old installation may persist.")]
    InstallCleanupIncomplete,

    #[error("Updater executable was not renamed and it will not be updated.")]
    SelfRenameFailed(#[source] std::io::Error),

    #[error("Some temporary files were not removed.")]
    FinalCleanupIncomplete,

    #[error("{} was not started successfully. Start it manually.", .path.display())]
    RelaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::CopyIncomplete { .. }
                | Self::InstallCleanupIncomplete
                | Self::SelfRenameFailed(_)
                | Self::FinalCleanupIncomplete
        )
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
