pub mod args;
pub mod extract;
pub mod instance;
pub mod launch;
pub mod version;

use std::error::Error as _;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, UpdateError};
use crate::fsops::{
    copy_directory_merge, remove_directory, remove_directory_contents, FileSystem,
};
use crate::progress::{detail, ProgressSink};

pub use args::UpdateArguments;
use extract::{find_update_root, ArchiveExtractor, ExtractionRequest};
use instance::{InstanceChannel, InstanceTerminator, Waiter};
use launch::Launcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    NotStarted,
    Running,
    ExitNormal,
    ExitError,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExitNormal | Self::ExitError)
    }

    /// Process exit code for a terminal state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExitNormal => 0,
            _ => 1,
        }
    }
}

/// Everything the updater touches outside its own memory.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub fs: &'a dyn FileSystem,
    pub channel: &'a dyn InstanceChannel,
    pub waiter: &'a dyn Waiter,
    pub extractor: &'a dyn ArchiveExtractor,
    pub launcher: &'a dyn Launcher,
}

/// Replaces an installation with the contents of an update archive.
///
/// The stages run strictly in order; the first fatal error ends the run in
/// `ExitError`, non-fatal ones are logged and the run continues.
pub struct Updater<'a, S: ProgressSink> {
    config: &'a Config,
    services: Services<'a>,
    sink: S,
    state: OrchestratorState,
    arguments: Option<UpdateArguments>,
}

impl<'a, S: ProgressSink> Updater<'a, S> {
    pub fn new(config: &'a Config, services: Services<'a>, sink: S) -> Self {
        Self {
            config,
            services,
            sink,
            state: OrchestratorState::NotStarted,
            arguments: None,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn arguments(&self) -> Option<&UpdateArguments> {
        self.arguments.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run the whole update once. Later calls return the terminal state
    /// without doing anything.
    pub fn start_upgrade(&mut self, raw_arguments: &[String]) -> OrchestratorState {
        if self.state != OrchestratorState::NotStarted {
            return self.state;
        }
        self.state = OrchestratorState::Running;
        tracing::info!(arguments = raw_arguments.len(), "update started");

        self.sink
            .heading(&format!("Welcome to {} updater", self.config.app_title));
        self.sink
            .line(&format!("Updater version {}.", version::UPDATER_VERSION));
        self.sink.line("Analyzing updater arguments.");

        self.state = match self.run(raw_arguments) {
            Ok(()) => OrchestratorState::ExitNormal,
            Err(e) => {
                self.report_fatal(&e);
                OrchestratorState::ExitError
            }
        };

        tracing::info!(state = ?self.state, "update finished");
        self.sink.line("\nPress any key to exit updater...");
        self.state
    }

    fn run(&mut self, raw_arguments: &[String]) -> Result<()> {
        let arguments = UpdateArguments::parse(raw_arguments, &self.config.app_name)?;
        self.arguments = Some(arguments.clone());

        self.print_arguments(&arguments);
        self.print_update_information(&arguments)?;
        self.terminate_running_instance()?;
        self.preparation_cleanup(&arguments)?;
        let update_root = self.extract(&arguments)?;
        self.copy_files(&update_root, &arguments)?;
        self.final_cleanup(&arguments);
        self.relaunch(&arguments)
    }

    fn stage(&mut self, title: &str) {
        tracing::debug!(stage = title, "entering stage");
        self.sink.blank();
        self.sink.heading(title);
    }

    fn report_fatal(&mut self, error: &UpdateError) {
        tracing::error!(error = %error, "update aborted");
        self.sink.blank();
        self.sink.line(&describe(error));
    }

    fn report_warning(&mut self, error: &UpdateError) {
        tracing::warn!(error = %error, "update continues");
        self.sink.line(&describe(error));
    }

    fn print_arguments(&mut self, a: &UpdateArguments) {
        self.stage("Arguments");
        self.sink.line(&detail(
            "Updater executable file",
            a.updater_executable_path.display(),
        ));
        self.sink.line(&detail(
            "Application executable file",
            a.target_executable_path.display(),
        ));
        self.sink.line(&detail("Temp folder", a.archive_parent_path.display()));
        self.sink.line(&detail(
            "Application temp folder",
            a.extraction_temp_path.display(),
        ));
    }

    fn print_update_information(&mut self, a: &UpdateArguments) -> Result<()> {
        let fs = self.services.fs;
        let exists = fs.exists(&a.update_archive_path);
        let size = fs.file_size(&a.update_archive_path).unwrap_or(0);
        let change = version::classify(&a.current_version, &a.next_version);

        self.stage("Update information");
        self.sink.line(&detail(
            "Version change",
            format!(
                "{} --> {} ({})",
                a.current_version,
                a.next_version,
                change.describe()
            ),
        ));
        if change != version::VersionChange::Upgrade {
            tracing::warn!(
                current = %a.current_version,
                next = %a.next_version,
                "update does not raise the version"
            );
        }
        self.sink.line(&detail("Update file", a.update_archive_path.display()));
        self.sink.line(&detail(
            "Update file exists",
            if exists { "yes" } else { "no" },
        ));
        self.sink.line(&detail("Update file size", format!("{} bytes", size)));

        if !exists {
            return Err(UpdateError::UpdateFileMissing(a.update_archive_path.clone()));
        }
        Ok(())
    }

    fn terminate_running_instance(&mut self) -> Result<()> {
        self.stage("Running instances");

        let terminator = InstanceTerminator {
            channel: self.services.channel,
            waiter: self.services.waiter,
            app_title: &self.config.app_title,
            quit_message: &self.config.quit_message,
            timeout: self.config.quit_timeout(),
            attempts: self.config.quit_attempts,
        };
        let rounds = terminator.terminate(&mut self.sink)?;
        tracing::debug!(rounds, "application is not running");
        Ok(())
    }

    /// Names kept while the old installation is cleared.
    fn install_exceptions(&self, a: &UpdateArguments) -> (Vec<String>, Vec<String>) {
        let mut files: Vec<String> = self
            .config
            .extractor_file_name()
            .into_iter()
            .chain(a.updater_file_name())
            .collect();

        if a.archive_parent_path == a.install_root_path {
            if let Some(name) = a.update_archive_path.file_name() {
                files.push(name.to_string_lossy().into_owned());
            }
        }

        (files, vec![self.config.data_dir.clone()])
    }

    fn preparation_cleanup(&mut self, a: &UpdateArguments) -> Result<()> {
        let fs = self.services.fs;
        self.stage("Initial cleanup");

        if fs.is_dir(&a.extraction_temp_path) {
            if !remove_directory(fs, &a.extraction_temp_path, &[], &[]) {
                return Err(UpdateError::StaleTempCleanupFailed(
                    a.extraction_temp_path.clone(),
                ));
            }
            self.sink.line("Cleanup of old temporary files is done.");
        }

        let (file_exceptions, dir_exceptions) = self.install_exceptions(a);
        self.sink.line(&detail(
            "Removing old installation files",
            a.install_root_path.display(),
        ));
        if remove_directory_contents(
            fs,
            &a.install_root_path,
            &file_exceptions,
            &dir_exceptions,
        ) {
            self.sink.line("Old installation files were removed.");
        } else {
            self.report_warning(&UpdateError::InstallCleanupIncomplete);
        }

        let backup = a.updater_backup_path();
        if fs.exists(&backup) {
            if let Err(e) = fs.remove_file(&backup) {
                tracing::debug!(file = %backup.display(), error = %e, "cannot remove old backup");
            }
        }
        match fs.rename(&a.updater_executable_path, &backup) {
            Ok(()) => self
                .sink
                .line(&detail("Updater executable moved aside", backup.display())),
            Err(e) => self.report_warning(&UpdateError::SelfRenameFailed(e)),
        }

        Ok(())
    }

    fn extract(&mut self, a: &UpdateArguments) -> Result<PathBuf> {
        let extractor = self.services.extractor;
        self.stage("Extraction of update package");

        let request = ExtractionRequest {
            archive: &a.update_archive_path,
            destination: &a.extraction_temp_path,
            working_dir: &a.install_root_path,
        };

        self.sink.line(&format!(
            "Calling extractor {} with these arguments:",
            extractor.program(&request)
        ));
        for argument in extractor.arguments(&request) {
            self.sink.line(&format!("   -> '{}'", argument.to_string_lossy()));
        }

        let output = extractor.extract(&request)?;
        let text = output.output.trim_end();
        if !text.is_empty() {
            self.sink.line(text);
        }

        let reason = match output.exit_code {
            Some(code) => {
                self.sink
                    .line(&format!("Extractor finished with exit code {}.", code));
                format!("exit code {}", code)
            }
            None => {
                self.sink.line("Extractor terminated abnormally.");
                "terminated abnormally".to_string()
            }
        };
        if !output.success() {
            return Err(UpdateError::ExtractionFailed { reason });
        }

        let update_root = find_update_root(self.services.fs, &a.extraction_temp_path)?;
        self.sink
            .line(&detail("Update root folder", update_root.display()));
        Ok(update_root)
    }

    fn copy_files(&mut self, update_root: &Path, a: &UpdateArguments) -> Result<()> {
        self.stage("Copying new files");

        let report = copy_directory_merge(
            self.services.fs,
            &mut self.sink,
            update_root,
            &a.install_root_path,
        )?;

        self.sink.line(&format!(
            "Copied {} of {} files.",
            report.copied,
            report.attempted()
        ));
        if !report.is_complete() {
            self.report_warning(&UpdateError::CopyIncomplete {
                failed: report.failed.len(),
                attempted: report.attempted(),
            });
        }
        Ok(())
    }

    fn final_cleanup(&mut self, a: &UpdateArguments) {
        let fs = self.services.fs;
        self.stage("Final cleanup");

        let result_path = remove_directory(fs, &a.extraction_temp_path, &[], &[]);
        let result_file = fs.remove_file(&a.update_archive_path).is_ok();

        self.sink.line(&format!(
            "Removing temporary files\n   -> {} -> {}\n   -> {} -> {}",
            a.extraction_temp_path.display(),
            outcome(result_path),
            a.update_archive_path.display(),
            outcome(result_file)
        ));

        if !(result_path && result_file) {
            self.report_warning(&UpdateError::FinalCleanupIncomplete);
        }
    }

    fn relaunch(&mut self, a: &UpdateArguments) -> Result<()> {
        self.sink.line("\nApplication was upgraded without serious errors.");

        self.services
            .launcher
            .spawn_detached(&a.target_executable_path, &a.install_root_path)
            .map_err(|source| UpdateError::RelaunchFailed {
                path: a.target_executable_path.clone(),
                source,
            })?;

        self.sink
            .line(&format!("{} was started.", self.config.app_title));
        Ok(())
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

/// Error text with its cause, for the operator.
fn describe(error: &UpdateError) -> String {
    match error.source() {
        Some(source) => format!("{} ({})", error, source),
        None => error.to_string(),
    }
}
