//! Loaded content packages.

use crate::archive::{normalize_path, ArchiveIndex};
use crate::manifest::{parse_manifest, Manifest, ManifestResource};
use crate::resolve::{resolve_entry, ResolvedEntry};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Well-known manifest location at the archive root.
pub const MANIFEST_PATH: &str = "imsmanifest.xml";

/// Runtime contract generation a package was authored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecVersion {
    Scorm12,
    Scorm2004,
    Unknown,
}

impl SpecVersion {
    fn detect(manifest: &Manifest) -> Self {
        if let Some(version) = manifest.schema_version.as_deref() {
            let version = version.to_ascii_lowercase();
            if version.contains("1.2") {
                return SpecVersion::Scorm12;
            }
            if version.contains("2004") || version.contains("1.3") {
                return SpecVersion::Scorm2004;
            }
        }

        match manifest.namespace_is_2004 {
            Some(true) => SpecVersion::Scorm2004,
            Some(false) => SpecVersion::Scorm12,
            None => SpecVersion::Unknown,
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecVersion::Scorm12 => write!(f, "SCORM 1.2"),
            SpecVersion::Scorm2004 => write!(f, "SCORM 2004"),
            SpecVersion::Unknown => write!(f, "unknown"),
        }
    }
}

/// Broad kind of media a resource's entry point is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Html,
    Video,
    Audio,
    Image,
    Pdf,
    Other,
}

impl MediaKind {
    /// Classify by the entry path's extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "html" | "htm" | "xhtml" => MediaKind::Html,
            "mp4" | "webm" | "m4v" | "mov" | "ogv" => MediaKind::Video,
            "mp3" | "m4a" | "wav" | "ogg" | "aac" => MediaKind::Audio,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" => MediaKind::Image,
            "pdf" => MediaKind::Pdf,
            _ => MediaKind::Other,
        }
    }
}

/// A resource declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: String,
    /// Normalized archive path of the declared entry point (query removed).
    pub entry_path: String,
    /// Query string declared on the entry href, without the `?`.
    pub launch_query: Option<String>,
    pub media_kind: MediaKind,
    pub resource_type: Option<String>,
    pub scorm_type: Option<String>,
    pub base: String,
}

impl Resource {
    fn from_manifest(raw: &ManifestResource) -> Self {
        let href = raw.href.as_deref().unwrap_or_default();
        let (path, query) = match href.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (href, None),
        };
        let path = path.split('#').next().unwrap_or_default();

        let entry_path = if path.is_empty() {
            String::new()
        } else {
            normalize_path(&format!("{}/{}", raw.base, path))
        };

        Self {
            id: raw.identifier.clone(),
            media_kind: MediaKind::from_path(&entry_path),
            entry_path,
            launch_query: query.filter(|q| !q.is_empty()),
            resource_type: raw.resource_type.clone(),
            scorm_type: raw.scorm_type.clone(),
            base: normalize_path(&raw.base),
        }
    }
}

/// One navigable unit of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub resource_ref: String,
    /// Position in playback order, starting at 0.
    pub ordinal: usize,
    pub parameters: Option<String>,
}

/// A loaded package. Immutable; loading a new package replaces it wholesale.
#[derive(Debug, Clone)]
pub struct ContentPackage {
    pub title: String,
    pub spec_version: SpecVersion,
    pub items: Vec<ContentItem>,
    pub resources: HashMap<String, Resource>,
    pub archive: ArchiveIndex,
}

impl ContentPackage {
    /// Load a package from zip bytes.
    pub fn from_zip(data: &[u8]) -> Result<Self> {
        let archive = ArchiveIndex::from_zip(data)?;
        Self::from_archive(archive)
    }

    /// Load a package from an already-built archive index.
    pub fn from_archive(archive: ArchiveIndex) -> Result<Self> {
        let manifest_bytes = archive
            .get(MANIFEST_PATH)
            .or_else(|| {
                archive
                    .paths()
                    .find(|p| p.eq_ignore_ascii_case(MANIFEST_PATH))
                    .and_then(|p| archive.get(p))
            })
            .ok_or_else(|| Error::MissingManifest {
                path: MANIFEST_PATH.to_string(),
            })?;

        let manifest = parse_manifest(manifest_bytes)?;
        let spec_version = SpecVersion::detect(&manifest);

        let resources: HashMap<String, Resource> = manifest
            .resources
            .iter()
            .filter(|r| !r.identifier.is_empty())
            .map(|r| (r.identifier.clone(), Resource::from_manifest(r)))
            .collect();

        let items: Vec<ContentItem> = manifest
            .items
            .iter()
            .filter_map(|item| {
                item.identifier_ref.as_ref().map(|resource_ref| (item, resource_ref))
            })
            .enumerate()
            .map(|(ordinal, (item, resource_ref))| ContentItem {
                id: item.identifier.clone(),
                title: item.title.clone(),
                resource_ref: resource_ref.clone(),
                ordinal,
                parameters: item.parameters.clone(),
            })
            .collect();

        if items.is_empty() {
            return Err(Error::EmptyPackage);
        }

        let title = manifest
            .title
            .clone()
            .unwrap_or_else(|| "Untitled package".to_string());

        tracing::info!(
            "Loaded package '{}' ({}, {} items, {} files)",
            title,
            spec_version,
            items.len(),
            archive.len()
        );

        Ok(Self {
            title,
            spec_version,
            items,
            resources,
            archive,
        })
    }

    /// The resource an item points at.
    pub fn resource_for(&self, item: &ContentItem) -> Option<&Resource> {
        self.resources.get(&item.resource_ref)
    }

    /// Resolve the effective entry document of the item at `index`.
    pub fn resolve_item(&self, index: usize) -> Result<ResolvedEntry> {
        let item = self
            .items
            .get(index)
            .ok_or_else(|| Error::resolution(format!("#{}", index), "<no such item>"))?;

        let resource = self
            .resource_for(item)
            .ok_or_else(|| Error::resolution(&item.id, format!("resource {}", item.resource_ref)))?;

        resolve_entry(&self.archive, resource)
            .ok_or_else(|| Error::resolution(&item.id, &resource.entry_path))
    }

    /// Directory used as the base for relative lookups: the directory of the
    /// first item's declared entry.
    pub fn base_dir(&self) -> String {
        self.items
            .first()
            .and_then(|item| self.resource_for(item))
            .map(|r| crate::archive::parent_dir(&r.entry_path).to_string())
            .unwrap_or_default()
    }

    /// Serializable overview for display.
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            title: self.title.clone(),
            spec_version: self.spec_version,
            file_count: self.archive.len(),
            total_bytes: self.archive.total_bytes(),
            items: self
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| ItemSummary {
                    item: item.clone(),
                    resource: self.resource_for(item).cloned(),
                    entry: self.resolve_item(index).ok(),
                })
                .collect(),
        }
    }
}

/// Serializable package overview.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub title: String,
    pub spec_version: SpecVersion,
    pub file_count: usize,
    pub total_bytes: usize,
    pub items: Vec<ItemSummary>,
}

/// Serializable item overview with its resolved entry, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    #[serde(flatten)]
    pub item: ContentItem,
    pub resource: Option<Resource>,
    pub entry: Option<ResolvedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manifest(items: &str, resources: &str) -> String {
        format!(
            r#"<manifest xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2">
              <metadata><schemaversion>1.2</schemaversion></metadata>
              <organizations default="O"><organization identifier="O"><title>Course</title>
              {items}
              </organization></organizations>
              <resources>{resources}</resources></manifest>"#
        )
    }

    fn package(files: Vec<(&str, String)>) -> Result<ContentPackage> {
        let archive = ArchiveIndex::from_entries(files.into_iter().map(|(p, c)| (p, c.into_bytes())));
        ContentPackage::from_archive(archive)
    }

    #[test]
    fn test_items_in_manifest_order() {
        let xml = manifest(
            r#"<item identifier="B" identifierref="R2"><title>Second?</title></item>
               <item identifier="A" identifierref="R1"><title>First?</title></item>
               <item identifier="C" identifierref="R1"/>"#,
            r#"<resource identifier="R1" href="one/index.html"/>
               <resource identifier="R2" href="two/page.html?x=1"/>"#,
        );
        let pkg = package(vec![
            ("imsmanifest.xml", xml),
            ("one/index.html", "1".to_string()),
            ("two/page.html", "2".to_string()),
        ])
        .unwrap();

        assert_eq!(pkg.title, "Course");
        assert_eq!(pkg.spec_version, SpecVersion::Scorm12);
        let ids: Vec<&str> = pkg.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert_eq!(pkg.items[2].ordinal, 2);

        let r2 = &pkg.resources["R2"];
        assert_eq!(r2.entry_path, "two/page.html");
        assert_eq!(r2.launch_query.as_deref(), Some("x=1"));
        assert_eq!(r2.media_kind, MediaKind::Html);

        assert_eq!(pkg.resolve_item(0).unwrap().path, "two/page.html");
        assert_eq!(pkg.base_dir(), "two");
    }

    #[test]
    fn test_missing_manifest() {
        let result = package(vec![("index.html", "x".to_string())]);
        assert_matches!(result, Err(Error::MissingManifest { .. }));
    }

    #[test]
    fn test_manifest_case_insensitive_lookup() {
        let xml = manifest(
            r#"<item identifier="A" identifierref="R"/>"#,
            r#"<resource identifier="R" href="a.html"/>"#,
        );
        let pkg = package(vec![("IMSManifest.xml", xml), ("a.html", "a".to_string())]).unwrap();
        assert_eq!(pkg.items.len(), 1);
    }

    #[test]
    fn test_empty_package() {
        let xml = manifest("", r#"<resource identifier="R" href="a.html"/>"#);
        let result = package(vec![("imsmanifest.xml", xml)]);
        assert_matches!(result, Err(Error::EmptyPackage));
    }

    #[test]
    fn test_unknown_resource_is_resolution_error() {
        let xml = manifest(r#"<item identifier="A" identifierref="NOPE"/>"#, "");
        let pkg = package(vec![("imsmanifest.xml", xml)]).unwrap();
        assert_matches!(pkg.resolve_item(0), Err(Error::Resolution { .. }));
        assert_matches!(pkg.resolve_item(5), Err(Error::Resolution { .. }));
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(MediaKind::from_path("a/b.HTM"), MediaKind::Html);
        assert_eq!(MediaKind::from_path("clip.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_path("doc.pdf"), MediaKind::Pdf);
        assert_eq!(MediaKind::from_path("noext"), MediaKind::Other);
    }
}
