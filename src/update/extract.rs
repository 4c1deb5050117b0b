use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::error::{Result, UpdateError};
use crate::fsops::FileSystem;

/// What to unpack, where to, and from which working directory.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub archive: &'a Path,
    pub destination: &'a Path,
    pub working_dir: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutput {
    /// `None` when the extractor did not exit normally.
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl ExtractionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait ArchiveExtractor {
    /// Program name shown to the operator.
    fn program(&self, request: &ExtractionRequest) -> String;

    fn arguments(&self, request: &ExtractionRequest) -> Vec<OsString>;

    /// Run the extraction. An error means it could not be run at all; a
    /// non-zero exit is reported through [`ExtractionOutput`].
    fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput>;
}

/// Arguments for a 7-Zip compatible extractor.
pub fn seven_zip_arguments(archive: &Path, destination: &Path) -> Vec<OsString> {
    let mut output_switch = OsString::from("-o");
    output_switch.push(destination.as_os_str());

    vec![
        "x".into(),
        "-r".into(),
        "-y".into(),
        output_switch,
        archive.as_os_str().to_os_string(),
    ]
}

/// Runs an external 7-Zip compatible executable.
pub struct ExternalExtractor {
    executable: PathBuf,
    show_spinner: bool,
}

impl ExternalExtractor {
    pub fn new(executable: impl Into<PathBuf>, show_spinner: bool) -> Self {
        Self {
            executable: executable.into(),
            show_spinner,
        }
    }

    /// A relative name is looked up in the working directory first, then on PATH.
    fn resolve(&self, working_dir: &Path) -> PathBuf {
        if self.executable.is_relative() {
            let local = working_dir.join(&self.executable);
            if local.is_file() {
                return local;
            }
        }
        self.executable.clone()
    }

    fn spinner(&self) -> ProgressBar {
        if !self.show_spinner {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} extracting ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

impl ArchiveExtractor for ExternalExtractor {
    fn program(&self, request: &ExtractionRequest) -> String {
        self.resolve(request.working_dir).display().to_string()
    }

    fn arguments(&self, request: &ExtractionRequest) -> Vec<OsString> {
        seven_zip_arguments(request.archive, request.destination)
    }

    fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput> {
        let program = self.resolve(request.working_dir);
        tracing::debug!(program = %program.display(), "starting extractor");

        let spinner = self.spinner();
        let result = Command::new(&program)
            .args(self.arguments(request))
            .current_dir(request.working_dir)
            .output();
        spinner.finish_and_clear();

        let output = result.map_err(|e| UpdateError::ExtractionFailed {
            reason: format!("cannot start {}: {}", program.display(), e),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExtractionOutput {
            exit_code: output.status.code(),
            output: text,
        })
    }
}

/// Unpacks `.zip` and `.tar.gz` archives in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

fn detect_format(archive: &Path) -> Option<ArchiveFormat> {
    let name = archive.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

fn unpack(format: ArchiveFormat, archive: &Path, dest_dir: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    let file = File::open(archive).context("Failed to open archive")?;

    match format {
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            tar::Archive::new(decoder)
                .unpack(dest_dir)
                .context("Failed to extract tar.gz")
        }
        ArchiveFormat::Zip => zip::ZipArchive::new(file)
            .context("Failed to read zip archive")?
            .extract(dest_dir)
            .context("Failed to extract zip"),
    }
}

impl ArchiveExtractor for BuiltinExtractor {
    fn program(&self, _request: &ExtractionRequest) -> String {
        "builtin".to_string()
    }

    fn arguments(&self, request: &ExtractionRequest) -> Vec<OsString> {
        vec![
            request.archive.as_os_str().to_os_string(),
            request.destination.as_os_str().to_os_string(),
        ]
    }

    fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput> {
        let format = detect_format(request.archive).ok_or_else(|| UpdateError::ExtractionFailed {
            reason: format!("unknown archive format: {}", request.archive.display()),
        })?;

        fs::create_dir_all(request.destination).map_err(|e| UpdateError::ExtractionFailed {
            reason: format!("cannot create {}: {}", request.destination.display(), e),
        })?;

        if let Err(e) = unpack(format, request.archive, request.destination) {
            return Ok(ExtractionOutput {
                exit_code: Some(2),
                output: format!("{:#}", e),
            });
        }

        let files = WalkDir::new(request.destination)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();

        Ok(ExtractionOutput {
            exit_code: Some(0),
            output: format!(
                "Unpacked {} files into {}",
                files,
                request.destination.display()
            ),
        })
    }
}

/// The single directory the archive unpacked into.
pub fn find_update_root(fs: &dyn FileSystem, extraction_temp: &Path) -> Result<PathBuf> {
    let mut roots: Vec<PathBuf> = fs
        .read_dir(extraction_temp)
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.is_dir() && !e.is_symlink)
        .map(|e| e.path)
        .collect();

    match roots.len() {
        1 => Ok(roots.remove(0)),
        found => Err(UpdateError::UnexpectedArchiveLayout { found }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::StdFileSystem;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_seven_zip_arguments() {
        let args = seven_zip_arguments(Path::new("/tmp/update.7z"), Path::new("/tmp/rssguard"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["x", "-r", "-y", "-o/tmp/rssguard", "/tmp/update.7z"]);
    }

    #[test]
    fn test_single_root_is_found() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("rssguard-2.0")).unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let root = find_update_root(&StdFileSystem, dir.path()).unwrap();
        assert_eq!(root, dir.path().join("rssguard-2.0"));
    }

    #[test]
    fn test_zero_or_many_roots_fail() {
        let dir = TempDir::new().unwrap();
        let err = find_update_root(&StdFileSystem, dir.path()).unwrap_err();
        assert!(matches!(err, UpdateError::UnexpectedArchiveLayout { found: 0 }));

        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let err = find_update_root(&StdFileSystem, dir.path()).unwrap_err();
        assert!(matches!(err, UpdateError::UnexpectedArchiveLayout { found: 2 }));
    }

    #[test]
    fn test_missing_temp_has_no_root() {
        let dir = TempDir::new().unwrap();
        let err = find_update_root(&StdFileSystem, &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, UpdateError::UnexpectedArchiveLayout { found: 0 }));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("u.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(detect_format(Path::new("U.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(detect_format(Path::new("u.7z")), None);
    }

    #[test]
    fn test_builtin_unpacks_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("update.tar.gz");

        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"new binary";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "rssguard-2.0/rssguard", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("rssguard");
        let output = BuiltinExtractor
            .extract(&ExtractionRequest {
                archive: &archive,
                destination: &dest,
                working_dir: dir.path(),
            })
            .unwrap();

        assert!(output.success());
        assert!(output.output.starts_with("Unpacked 1 files"));
        assert_eq!(
            fs::read_to_string(dest.join("rssguard-2.0").join("rssguard")).unwrap(),
            "new binary"
        );
    }

    #[test]
    fn test_builtin_reports_corrupt_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("update.zip");
        File::create(&archive).unwrap().write_all(b"not a zip").unwrap();

        let output = BuiltinExtractor
            .extract(&ExtractionRequest {
                archive: &archive,
                destination: &dir.path().join("out"),
                working_dir: dir.path(),
            })
            .unwrap();

        assert!(!output.success());
        assert!(output.output.contains("Failed to read zip archive"));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_extractor_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let extractor = ExternalExtractor::new("false", false);

        let output = extractor
            .extract(&ExtractionRequest {
                archive: Path::new("/nonexistent.7z"),
                destination: &dir.path().join("out"),
                working_dir: dir.path(),
            })
            .unwrap();

        assert_eq!(output.exit_code, Some(1));
        assert!(!output.success());
    }

    #[test]
    fn test_missing_external_extractor_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let extractor = ExternalExtractor::new("definitely-not-an-extractor-7za", false);

        let err = extractor
            .extract(&ExtractionRequest {
                archive: Path::new("update.7z"),
                destination: &dir.path().join("out"),
                working_dir: dir.path(),
            })
            .unwrap_err();

        assert!(matches!(err, UpdateError::ExtractionFailed { .. }));
    }
}
