//! In-memory archive index.
//!
//! An [`ArchiveIndex`] maps normalized logical paths to file contents. It is
//! built once per loaded package and is read-only afterwards; clones share the
//! same underlying map.

use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Read-only mapping from normalized archive path to file bytes.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    files: Arc<HashMap<String, Bytes>>,
}

impl ArchiveIndex {
    /// Build an index from raw zip bytes.
    ///
    /// Directory entries are skipped and every path is normalized with
    /// [`normalize_path`].
    pub fn from_zip(data: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
        let mut files = HashMap::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let normalized = normalize_path(file.name());
            if normalized.is_empty() {
                continue;
            }

            let mut contents = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut contents)?;
            files.insert(normalized, Bytes::from(contents));
        }

        if files.is_empty() {
            return Err(Error::Archive("archive contains no files".to_string()));
        }

        tracing::debug!("Indexed {} archive entries", files.len());

        Ok(Self {
            files: Arc::new(files),
        })
    }

    /// Build an index from already-extracted entries.
    pub fn from_entries<I, P, B>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, B)>,
        P: AsRef<str>,
        B: Into<Bytes>,
    {
        let files = entries
            .into_iter()
            .map(|(path, data)| (normalize_path(path.as_ref()), data.into()))
            .filter(|(path, _)| !path.is_empty())
            .collect();

        Self {
            files: Arc::new(files),
        }
    }

    /// Exact lookup of an already-normalized path.
    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// Whether the exact path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// All paths in the archive, unordered.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Paths of the files located directly in `dir` (not in subdirectories),
    /// sorted for deterministic iteration.
    pub fn files_in_dir(&self, dir: &str) -> Vec<&str> {
        let dir = dir.trim_end_matches('/');
        let mut paths: Vec<&str> = self
            .paths()
            .filter(|path| parent_dir(path) == dir)
            .collect();
        paths.sort_unstable();
        paths
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the archive holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all files in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Bytes::len).sum()
    }
}

/// Normalize an archive path: backslashes become slashes, leading slashes and
/// `.` segments are dropped and `..` pops the previous segment.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Directory part of a normalized path (empty for root-level files).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// File name part of a normalized path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b.html"), "a/b.html");
        assert_eq!(normalize_path("a\\b\\c.js"), "a/b/c.js");
        assert_eq!(normalize_path("./a/./b/../c.css"), "a/c.css");
        assert_eq!(normalize_path("//x//y"), "x/y");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent_dir("course/lesson/index.html"), "course/lesson");
        assert_eq!(parent_dir("index.html"), "");
        assert_eq!(file_name("course/lesson/index.html"), "index.html");
        assert_eq!(file_name("index.html"), "index.html");
    }

    #[test]
    fn test_from_zip() {
        let data = build_zip(&[
            ("imsmanifest.xml", &b"<manifest/>"[..]),
            ("content/index.html", &b"<html></html>"[..]),
            ("content/app.js", &b"console.log(1)"[..]),
        ]);

        let archive = ArchiveIndex::from_zip(&data).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(
            archive.get("content/index.html").map(|b| b.as_ref()),
            Some(&b"<html></html>"[..])
        );
        assert_eq!(archive.total_bytes(), 11 + 13 + 14);
    }

    #[test]
    fn test_from_zip_rejects_garbage() {
        let result = ArchiveIndex::from_zip(b"not a zip file");
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_files_in_dir() {
        let archive = ArchiveIndex::from_entries([
            ("a/index.html", &b"1"[..]),
            ("a/b.html", &b"2"[..]),
            ("a/sub/c.html", &b"3"[..]),
            ("root.html", &b"4"[..]),
        ]);

        assert_eq!(archive.files_in_dir("a"), vec!["a/b.html", "a/index.html"]);
        assert_eq!(archive.files_in_dir("a/"), vec!["a/b.html", "a/index.html"]);
        assert_eq!(archive.files_in_dir(""), vec!["root.html"]);
    }

    #[test]
    fn test_clones_share_storage() {
        let archive = ArchiveIndex::from_entries([("x.txt", &b"x"[..])]);
        let clone = archive.clone();
        assert!(Arc::ptr_eq(&archive.files, &clone.files));
    }
}
