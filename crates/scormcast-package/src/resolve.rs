//! Content entry resolution.
//!
//! A resource's declared entry point is not always the playable page. Some
//! producer tools point at a generic launcher that expects a real LMS around it.
//! When the declared entry is missing or looks like a launcher, a sibling
//! document in the same directory is used instead.

use crate::archive::{file_name, parent_dir, ArchiveIndex};
use crate::package::Resource;
use serde::Serialize;

/// File stems that identify launcher/indirection pages.
const LAUNCHER_STEMS: &[&str] = &[
    "launcher",
    "launch",
    "goodbye",
    "blank",
    "api_wrapper",
];

/// File stem prefixes that identify launcher/indirection pages.
const LAUNCHER_PREFIXES: &[&str] = &[
    "scormdriver",
    "scorm_launcher",
    "scormcontent_launcher",
    "scorm_api",
    "indexapi",
];

/// The effective entry document for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    /// Archive path of the document to load.
    pub path: String,
    /// The entry path declared by the manifest.
    pub declared: String,
    /// Whether `path` replaced the declared entry.
    pub substituted: bool,
}

/// Whether a file name looks like a launcher page.
pub fn is_launcher_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => name.as_str(),
    };

    LAUNCHER_STEMS.contains(&stem) || LAUNCHER_PREFIXES.iter().any(|p| stem.starts_with(p))
}

fn is_html(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Resolve the entry document of `resource` against `archive`.
///
/// Returns `None` when neither the declared entry nor any fallback is
/// servable.
pub fn resolve_entry(archive: &ArchiveIndex, resource: &Resource) -> Option<ResolvedEntry> {
    let declared = resource.entry_path.as_str();
    let declared_ok =
        !declared.is_empty() && archive.contains(declared) && !is_launcher_name(file_name(declared));

    if declared_ok {
        return Some(ResolvedEntry {
            path: declared.to_string(),
            declared: declared.to_string(),
            substituted: false,
        });
    }

    let dir = if declared.is_empty() {
        resource.base.trim_end_matches('/')
    } else {
        parent_dir(declared)
    };

    let siblings = archive.files_in_dir(dir);

    let index = ["index.html", "index.htm"].iter().find_map(|wanted| {
        siblings
            .iter()
            .find(|path| file_name(path).eq_ignore_ascii_case(wanted))
    });

    let fallback = index.or_else(|| {
        siblings
            .iter()
            .find(|path| is_html(path) && !is_launcher_name(file_name(path)))
    });

    match fallback {
        Some(path) => {
            tracing::debug!(
                "Entry '{}' for resource {} replaced by '{}'",
                declared,
                resource.id,
                path
            );
            Some(ResolvedEntry {
                path: path.to_string(),
                declared: declared.to_string(),
                substituted: true,
            })
        }
        None => None,
    }
}
