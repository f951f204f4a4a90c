//! Path resolution and validation.
//!
//! [`PathResolver`] maps logical identifiers (library definitions, content
//! IDs, export names and cache keys) onto physical paths under the configured
//! base directory. It performs no I/O.
//!
//! The validation helpers exist because identifiers arrive from the web layer
//! and end up as path segments: a content ID of `../../etc` must never turn
//! into a path outside the storage root.

use crate::assets::AssetKind;
use crate::error::{ErrorKind, Result};
use crate::library::LibraryDefinition;
use crate::models::ContentId;
use std::path::{Component, Path, PathBuf};

pub(crate) const LIBRARIES_PATH: &str = "libraries";
pub(crate) const CONTENT_PATH: &str = "content";
pub(crate) const EXPORTS_PATH: &str = "exports";
pub(crate) const CACHED_ASSETS_PATH: &str = "cachedassets";
pub(crate) const EDITOR_PATH: &str = "editor";

/// Validates a relative storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use h5p_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("images/photo.png").is_ok());
/// assert!(validate_path("a/../photo.png").is_ok()); // (never leaves the root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../images/./photo.png/").unwrap(),
///     Path::new("images/photo.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, so reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates an identifier that will be used as exactly one path segment
/// (content IDs, export names, cache keys).
///
/// Stricter than [`validate`]: separators of either flavour, `.`, `..`, null
/// bytes and the empty string are all rejected instead of being normalized.
///
/// ```
/// use h5p_storage::validate_segment;
/// assert!(validate_segment("42").is_ok());
/// assert!(validate_segment("my-export.h5p").is_ok());
/// assert!(validate_segment("..").is_err());
/// assert!(validate_segment("a/b").is_err());
/// assert!(validate_segment("a\\b").is_err());
/// ```
pub fn validate_segment(segment: &str) -> Result<&str> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
        || !matches!(Path::new(segment).components().next(), Some(Component::Normal(_)));
    match invalid {
        true => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(segment))),
        false => Ok(segment),
    }
}

/// Maps logical identifiers to physical paths under a base directory.
///
/// Owns nothing but the base path and the optional editor working path, both
/// fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base: PathBuf,
    editor: Option<PathBuf>,
}
impl PathResolver {
    pub fn new(base: impl Into<PathBuf>, editor: Option<PathBuf>) -> Self {
        Self { base: base.into(), editor }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>/content/<id>`
    pub fn content_path(&self, id: &ContentId) -> PathBuf {
        self.base.join(CONTENT_PATH).join(id.as_str())
    }

    /// `<base>/libraries/<machineName>-<major>.<minor>`
    pub fn library_path(&self, library: &LibraryDefinition) -> PathBuf {
        self.base.join(LIBRARIES_PATH).join(library.as_string(true))
    }

    /// `<base>/exports/<name>`
    pub fn export_path(&self, name: &str) -> PathBuf {
        self.base.join(EXPORTS_PATH).join(name)
    }

    /// `<base>/cachedassets/<key>.<js|css>`
    pub fn cached_asset_path(&self, key: &str, kind: AssetKind) -> PathBuf {
        self.base.join(CACHED_ASSETS_PATH).join(format!("{key}.{}", kind.extension()))
    }

    /// The configured editor path, else `<base>/editor`.
    pub fn editor_path(&self) -> PathBuf {
        self.editor.clone().unwrap_or_else(|| self.base.join(EDITOR_PATH))
    }

    /// Every directory the storage layout expects to exist.
    pub fn working_paths(&self) -> [PathBuf; 5] {
        [
            self.base.join(LIBRARIES_PATH),
            self.base.join(CONTENT_PATH),
            self.base.join(EXPORTS_PATH),
            self.base.join(CACHED_ASSETS_PATH),
            self.editor_path(),
        ]
    }

    pub(crate) fn try_content_path(&self, id: &ContentId) -> Result<PathBuf> {
        validate_segment(id.as_str())?;
        Ok(self.content_path(id))
    }

    pub(crate) fn try_export_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.export_path(validate_segment(name)?))
    }

    pub(crate) fn try_cached_asset_path(&self, key: &str, kind: AssetKind) -> Result<PathBuf> {
        Ok(self.cached_asset_path(validate_segment(key)?, kind))
    }
}
