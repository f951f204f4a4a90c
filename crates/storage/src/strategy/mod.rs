//! Storage strategy trait and implementations.
//!
//! This module defines the `StorageStrategy` trait, the single contract every
//! place that stores libraries, content, exports and cached assets must
//! honour. The filesystem implementation is the canonical one; alternate
//! backends (object storage and the like) implement the same trait.

mod fs;

pub use self::fs::FileSystemStrategy;
use crate::assets::AssetBundle;
use crate::error::Result;
use crate::library::LibraryDefinition;
use crate::models::ContentId;
use crate::upload::{UploadResult, ValidatedUpload};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unified interface for library and content storage.
///
/// # Return values
/// Operations documented as "true only if verified" copy a tree and then
/// compare the result with what should have been copied. A mismatch is an
/// ordinary, recoverable outcome and is reported as `Ok(false)`. Failures of
/// the storage medium itself (permissions, full disk, device errors) are
/// never folded into the boolean: they propagate as `Err`, so callers can
/// tell "the data didn't make it intact" apart from "storage is broken".
///
/// # Identifiers
/// Content IDs, export names and cache keys end up as single path segments.
/// Implementations reject anything that would not stay a single segment with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) before touching
/// storage.
///
/// # Concurrency
/// Nothing here locks. Two callers racing to save the same library may
/// interleave their delete and copy steps; serialize at a higher layer if
/// that matters.
///
/// # Examples
///
/// ```
/// use h5p_storage::{ContentId, StorageStrategy, error::Result};
/// use std::path::Path;
///
/// async fn publish(strategy: &dyn StorageStrategy, draft: &Path, id: u64) -> Result<bool> {
///     let id = ContentId::from(id);
///     if !strategy.save_content(draft, &id).await? {
///         // Don't leave a half-copied content directory behind.
///         strategy.delete_content(&id).await?;
///         return Ok(false);
///     }
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait StorageStrategy: Send + Sync {
    /// Name of the configured strategy, used for logging only.
    fn name(&self) -> &str;

    /// Stores the library unpacked at
    /// [`upload_path()`](LibraryDefinition::upload_path), replacing any
    /// previous copy of the same identity. Ignored files are left out.
    ///
    /// True only if the stored library holds exactly the non-ignored files of
    /// the upload.
    async fn save_library(&self, library: &LibraryDefinition) -> Result<bool>;

    /// Copies a stored library (or `dev_override`, when developing a library
    /// outside of storage) to `<target>/<machineName>-<major>.<minor>`, with
    /// the ignore rules applied.
    ///
    /// True only if verified.
    async fn export_library(&self, library: &LibraryDefinition, target: &Path, dev_override: Option<&Path>)
    -> Result<bool>;

    /// Replaces the stored content `id` with the tree at `source`, with the
    /// ignore rules applied. True only if verified.
    async fn save_content(&self, source: &Path, id: &ContentId) -> Result<bool>;

    /// Removes the stored content `id`. Unknown IDs are not an error.
    async fn delete_content(&self, id: &ContentId) -> Result<()>;

    /// Copies stored content `id` to `new_id`, with the ignore rules applied.
    ///
    /// False if `id` doesn't exist or the copy doesn't verify.
    async fn clone_content(&self, id: &ContentId, new_id: &ContentId) -> Result<bool>;

    /// Copies stored content `id` to `target`, with the ignore rules applied.
    ///
    /// Exporting content that doesn't exist creates `target` as an empty
    /// directory and succeeds.
    async fn export_content(&self, id: &ContentId, target: &Path) -> Result<bool>;

    /// Copies `exports/<source>` to `exports/<output>`, replacing any earlier
    /// output of the same name. Export bundles are final, so nothing is
    /// filtered.
    ///
    /// False if the source export doesn't exist.
    async fn save_export(&self, source: &str, output: &str) -> Result<bool>;

    /// Removes `exports/<name>`, if present.
    async fn delete_export(&self, name: &str) -> Result<()>;

    async fn export_exists(&self, name: &str) -> Result<bool>;

    /// Merges `bundle` into aggregate files named after `key`.
    ///
    /// See [`AssetCache::merge_and_cache()`](crate::assets::AssetCache::merge_and_cache).
    async fn cache_assets(&self, bundle: &AssetBundle, key: &str) -> Result<Option<AssetBundle>>;

    /// The aggregates previously produced for `key`, if any.
    async fn get_cached_assets(&self, key: &str) -> Result<Option<AssetBundle>>;

    async fn delete_cached_assets(&self, keys: &[String]) -> Result<()>;

    /// Stores a validated editor upload under `<kind>s/<name>`, inside the
    /// content directory of `id` or, for content that hasn't been saved yet,
    /// inside the editor's draft area.
    async fn save_resource(&self, upload: &ValidatedUpload, id: Option<&ContentId>) -> Result<UploadResult>;

    /// Copies a single resource file (relative path, e.g. `images/cat.png`)
    /// from content `from` (or the draft area when `None`) into content `to`.
    /// An existing destination file is never overwritten.
    ///
    /// False if the source file doesn't exist.
    async fn clone_content_resource_item(&self, file: &Path, from: Option<&ContentId>, to: &ContentId)
    -> Result<bool>;

    /// Copies every resource of content `from` (or the draft area when
    /// `None`) into content `to`, skipping the content descriptor and any
    /// file already present at the destination.
    ///
    /// False if the source doesn't exist.
    async fn clone_content_resources(&self, from: Option<&ContentId>, to: &ContentId) -> Result<bool>;

    /// A fresh, unique path suitable for temporary files. Not created.
    fn get_writable_temp_path(&self) -> PathBuf;

    /// Whether files can be created inside the directory at `path`.
    async fn is_path_writable(&self, path: &Path) -> bool;
}
