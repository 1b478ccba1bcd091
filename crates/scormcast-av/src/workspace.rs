//! Scratch space for a recording and export of its artifacts.

use crate::{Error, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name prefix for exported recordings.
pub const ARTIFACT_PREFIX: &str = "scormcast-recording";

/// Temporary working directory for one recording.
///
/// Holds the raw clip and transcoder output until the user saves or discards
/// them. Everything inside is removed when the workspace is dropped.
///
/// # Example
///
/// ```no_run
/// use scormcast_av::Workspace;
///
/// let workspace = Workspace::new()?;
/// let clip = workspace.temp_file("capture.mjpeg");
/// std::fs::write(&clip, b"...")?;
/// let saved = workspace.export(&clip, "/tmp".as_ref(), "recording.mjpeg")?;
/// # Ok::<(), scormcast_av::Error>(())
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a new workspace in the system temp directory.
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("scormcast-")
            .tempdir()
            .map_err(|e| Error::Workspace(e.to_string()))?;
        Ok(Self { temp_dir })
    }

    /// Get the temp directory path.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a temp file path with the given name.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Copy `source` into `dir` as `file_name`.
    ///
    /// An existing file at the destination is kept as a backup until the copy
    /// succeeds, and restored if it fails.
    pub fn export(&self, source: &Path, dir: &Path, file_name: &str) -> Result<PathBuf> {
        if !source.exists() {
            return Err(Error::Workspace(format!(
                "Output file does not exist: {:?}",
                source
            )));
        }

        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Workspace(format!("Failed to create {:?}: {}", dir, e)))?;
        let dest = dir.join(file_name);

        if dest.exists() {
            let backup = dest.with_extension("bak");
            std::fs::rename(&dest, &backup).map_err(|e| {
                Error::Workspace(format!("Failed to create backup of existing file: {}", e))
            })?;

            if let Err(e) = std::fs::copy(source, &dest) {
                let _ = std::fs::rename(&backup, &dest);
                return Err(Error::Workspace(format!(
                    "Failed to copy output to destination: {}",
                    e
                )));
            }

            let _ = std::fs::remove_file(&backup);
        } else {
            std::fs::copy(source, &dest).map_err(|e| {
                Error::Workspace(format!("Failed to copy output to destination: {}", e))
            })?;
        }

        tracing::info!("Saved {}", dest.display());
        Ok(dest)
    }
}

/// Date-stamped artifact name, e.g. `scormcast-recording-2024-03-09.mp4`.
pub fn dated_file_name(date: NaiveDate, extension: &str) -> String {
    format!("{}-{}.{}", ARTIFACT_PREFIX, date.format("%Y-%m-%d"), extension)
}

/// Date-stamped artifact name for today in local time.
pub fn todays_file_name(extension: &str) -> String {
    dated_file_name(chrono::Local::now().date_naive(), extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file() {
        let workspace = Workspace::new().unwrap();
        let intermediate = workspace.temp_file("capture.mjpeg");
        assert!(intermediate.starts_with(workspace.temp_dir()));
        assert_eq!(intermediate.file_name().unwrap(), "capture.mjpeg");
    }

    #[test]
    fn test_temp_dir_removed_on_drop() {
        let workspace = Workspace::new().unwrap();
        let path = workspace.temp_dir().to_path_buf();
        assert!(path.exists());
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_export_copies_and_replaces() {
        let workspace = Workspace::new().unwrap();
        let out = tempfile::tempdir().unwrap();

        let source = workspace.temp_file("clip.mp4");
        std::fs::write(&source, b"first").unwrap();
        let dest = workspace.export(&source, out.path(), "a.mp4").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");

        std::fs::write(&source, b"second").unwrap();
        let dest = workspace.export(&source, out.path(), "a.mp4").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        assert!(!out.path().join("a.bak").exists());
    }

    #[test]
    fn test_export_missing_source() {
        let workspace = Workspace::new().unwrap();
        let out = tempfile::tempdir().unwrap();
        let missing = workspace.temp_file("missing.mp4");
        assert!(workspace.export(&missing, out.path(), "a.mp4").is_err());
    }

    #[test]
    fn test_dated_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            dated_file_name(date, "mp4"),
            "scormcast-recording-2024-03-09.mp4"
        );
    }
}
