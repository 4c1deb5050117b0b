use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use super::ProgressSink;

/// Appends the progress log to a file, one timestamped record per line.
pub struct TranscriptSink {
    path: PathBuf,
    writer: Option<LineWriter<File>>,
    warning: Option<String>,
}

impl TranscriptSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open transcript {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(LineWriter::new(file)),
            warning: None,
        })
    }

    fn record(&mut self, kind: &str, text: &str) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let result = if text.is_empty() {
            writeln!(writer, "{} {}", stamp, kind)
        } else {
            text.lines()
                .try_for_each(|line| writeln!(writer, "{} {} {}", stamp, kind, line))
        };

        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "transcript disabled");
            self.warning = Some(format!(
                "Writing to transcript {} failed, it is disabled ({}).",
                self.path.display(),
                e
            ));
            self.writer = None;
        }
    }
}

impl ProgressSink for TranscriptSink {
    fn heading(&mut self, text: &str) {
        self.record("##", text);
    }

    fn line(&mut self, text: &str) {
        self.record("  ", text);
    }

    fn blank(&mut self) {
        self.record("  ", "");
    }

    fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }
}
