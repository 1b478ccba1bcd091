//! Error types for scormcast-package.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading a package or resolving one of its items.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The uploaded bytes are not a readable zip archive.
    #[error("invalid archive: {0}")]
    Archive(String),

    /// The archive has no manifest at the well-known path.
    #[error("manifest not found: {path}")]
    MissingManifest { path: String },

    /// The manifest exists but could not be parsed.
    #[error("malformed manifest: {0}")]
    Manifest(String),

    /// The manifest parsed but declares no navigable items.
    #[error("package declares no playable items")]
    EmptyPackage,

    /// No servable entry document was found for an item.
    #[error("no servable entry document for item '{item}' (declared: {declared})")]
    Resolution { item: String, declared: String },

    /// An I/O error occurred while reading the archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an entry resolution error.
    pub fn resolution(item: impl Into<String>, declared: impl Into<String>) -> Self {
        Self::Resolution {
            item: item.into(),
            declared: declared.into(),
        }
    }

    /// Whether this error invalidates the whole load attempt (as opposed to a
    /// single item).
    pub fn is_package_error(&self) -> bool {
        !matches!(self, Error::Resolution { .. })
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Manifest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingManifest {
            path: "imsmanifest.xml".to_string(),
        };
        assert_eq!(err.to_string(), "manifest not found: imsmanifest.xml");

        let err = Error::resolution("ITEM-1", "launch.html");
        assert_eq!(
            err.to_string(),
            "no servable entry document for item 'ITEM-1' (declared: launch.html)"
        );
    }

    #[test]
    fn test_package_error_classification() {
        assert!(Error::EmptyPackage.is_package_error());
        assert!(Error::manifest("bad").is_package_error());
        assert!(!Error::resolution("a", "b").is_package_error());
    }
}
