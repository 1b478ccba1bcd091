//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the external
//! programs a recording needs: `ffmpeg` for transcoding and a Chromium-family
//! browser for the render surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tool name for the encoder.
pub const FFMPEG: &str = "ffmpeg";

/// Tool name for the headless browser.
pub const CHROME: &str = "chrome";

/// Known tool names, in report order.
const KNOWN_TOOLS: &[&str] = &[FFMPEG, CHROME];

/// Executable names tried, in order, when looking for the browser on `PATH`.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Optional path overrides for external tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Path to the ffmpeg executable.
    pub ffmpeg: Option<PathBuf>,
    /// Path to the Chrome/Chromium executable.
    pub chrome: Option<PathBuf>,
}

impl ToolPaths {
    fn get(&self, name: &str) -> Option<&Path> {
        match name {
            FFMPEG => self.ffmpeg.as_deref(),
            CHROME => self.chrome.as_deref(),
            _ => None,
        }
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of the version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools from overrides, falling back to `PATH`.
    ///
    /// An override that does not exist on disk is ignored. Tools that cannot
    /// be found are omitted from the registry.
    pub fn discover(paths: &ToolPaths) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let resolved = match paths.get(name) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured path for {} does not exist: {}",
                        name,
                        p.display()
                    );
                    search_path(name)
                }
                None => search_path(name),
            };

            if let Some(path) = resolved {
                tracing::debug!("Found {} at {}", name, path.display());
                tools.insert(name.to_string(), path);
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit locations.
    pub fn with_tools<I, N>(tools: I) -> Self
    where
        I: IntoIterator<Item = (N, PathBuf)>,
        N: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(|(n, p)| (n.into(), p)).collect(),
        }
    }

    /// Location of `name`, or [`Error::ToolNotFound`].
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::tool_not_found(name))
    }

    /// Location of `name`, if discovered.
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).map(PathBuf::as_path)
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    match name {
        CHROME => CHROME_CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok()),
        _ => which::which(name).ok(),
    }
}

/// Run the tool's version flag and return the first line of stdout.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        FFMPEG => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn discover_with_default_paths() {
        let registry = ToolRegistry::discover(&ToolPaths::default());
        // Nothing is guaranteed to be installed; the call must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        assert_matches!(
            registry.require(FFMPEG),
            Err(Error::ToolNotFound { tool }) if tool == "ffmpeg"
        );
    }

    #[test]
    fn check_all_reports_every_known_tool() {
        let registry = ToolRegistry::with_tools([(FFMPEG, PathBuf::from("/nonexistent/ffmpeg"))]);
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "chrome"]);
        assert!(infos[0].available);
        assert!(infos[0].version.is_none());
        assert!(!infos[1].available);
    }

    #[test]
    fn missing_override_is_ignored() {
        let paths = ToolPaths {
            ffmpeg: Some(PathBuf::from("/nonexistent/bin/ffmpeg-xyz")),
            chrome: None,
        };
        let registry = ToolRegistry::discover(&paths);
        if let Some(found) = registry.get(FFMPEG) {
            assert_ne!(found, Path::new("/nonexistent/bin/ffmpeg-xyz"));
        }
    }
}
