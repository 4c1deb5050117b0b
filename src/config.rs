use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Run the `extractor` executable
    #[default]
    External,
    /// Unpack .zip / .tar.gz in-process
    Builtin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Lowercase application name, also the extraction temp folder name
    pub app_name: String,

    /// Name shown in the progress log
    pub app_title: String,

    pub extractor: PathBuf,

    pub extractor_kind: ExtractorKind,

    /// Directory under the install root that survives the update
    pub data_dir: String,

    /// Identifier of the running instance's message channel
    pub instance_id: String,

    /// Explicit socket / pipe path, overriding the one derived from `instance_id`
    pub instance_socket: Option<PathBuf>,

    pub quit_message: String,

    pub quit_attempts: u32,

    pub quit_timeout_ms: u64,

    /// Also append the progress log to this file
    pub transcript: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "rssguard".to_string(),
            app_title: "RSS Guard".to_string(),
            extractor: PathBuf::from(if cfg!(windows) { "7za.exe" } else { "7za" }),
            extractor_kind: ExtractorKind::default(),
            data_dir: "data".to_string(),
            instance_id: "rssguard".to_string(),
            instance_socket: None,
            quit_message: "app_quit".to_string(),
            quit_attempts: 3,
            quit_timeout_ms: 6000,
            transcript: None,
        }
    }
}

impl Config {
    /// Load `explicit` if given, otherwise the default location. Only the
    /// default location may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config {}", config_path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.quit_attempts == 0 {
            bail!("quit_attempts must be at least 1");
        }
        if !is_plain_name(&config.app_name) {
            bail!("app_name must be a plain folder name");
        }

        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rssguard")
            .join("updater.toml")
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }

    /// File name of the extractor, kept when the old installation is cleared.
    pub fn extractor_file_name(&self) -> Option<String> {
        self.extractor
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// A single normal path component, so joining it never leaves its parent.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}
