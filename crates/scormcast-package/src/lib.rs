//! # scormcast-package
//!
//! Loading of zipped e-learning content packages.
//!
//! This crate provides:
//! - [`ArchiveIndex`]: an in-memory, read-only map from normalized archive
//!   path to file bytes
//! - Manifest parsing (`imsmanifest.xml`) into an ordered item list and a
//!   resource table
//! - Entry resolution that steps around launcher/indirection pages
//!
//! ## Example
//!
//! ```no_run
//! use scormcast_package::ContentPackage;
//!
//! let bytes = std::fs::read("course.zip")?;
//! let package = ContentPackage::from_zip(&bytes)?;
//! for (index, item) in package.items.iter().enumerate() {
//!     let entry = package.resolve_item(index)?;
//!     println!("{} -> {}", item.title, entry.path);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod archive;
mod error;
pub mod manifest;
pub mod package;
pub mod resolve;

pub use archive::{normalize_path, ArchiveIndex};
pub use error::{Error, Result};
pub use package::{
    ContentItem, ContentPackage, ItemSummary, MediaKind, PackageSummary, Resource, SpecVersion,
    MANIFEST_PATH,
};
pub use resolve::{is_launcher_name, resolve_entry, ResolvedEntry};
