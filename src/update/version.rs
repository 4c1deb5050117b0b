use anyhow::{anyhow, Result};
use semver::Version;

/// Version of the updater binary itself
pub const UPDATER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChange {
    Upgrade,
    Reinstall,
    Downgrade,
    /// At least one side is not a semantic version.
    Unknown,
}

impl VersionChange {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Reinstall => "reinstall of the same version",
            Self::Downgrade => "downgrade",
            Self::Unknown => "versions could not be compared",
        }
    }
}

/// Parse a version string (with or without 'v' prefix).
///
/// Two-component versions such as `3.1` are read as `3.1.0`.
pub fn parse_version(version_str: &str) -> Result<Version> {
    let cleaned = version_str.trim().trim_start_matches('v');
    let padded = match cleaned.matches('.').count() {
        0 => format!("{}.0.0", cleaned),
        1 => format!("{}.0", cleaned),
        _ => cleaned.to_string(),
    };
    Version::parse(&padded).map_err(|e| anyhow!("Invalid version '{}': {}", version_str, e))
}

/// Classify the change from `current` to `next`
pub fn classify(current: &str, next: &str) -> VersionChange {
    match (parse_version(current), parse_version(next)) {
        (Ok(current), Ok(next)) if next > current => VersionChange::Upgrade,
        (Ok(current), Ok(next)) if next == current => VersionChange::Reinstall,
        (Ok(_), Ok(_)) => VersionChange::Downgrade,
        _ => VersionChange::Unknown,
    }
}
