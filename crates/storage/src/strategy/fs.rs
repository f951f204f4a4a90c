//! Local filesystem storage strategy.
//!
//! Everything lives under one base directory in the standard layout
//! (`libraries/`, `content/`, `exports/`, `cachedassets/` and the editor's
//! draft area), accessed through [`TreeOps`] for async I/O.

use crate::assets::{AssetBundle, AssetCache};
use crate::error::{ErrorKind, Result};
use crate::ignore::IgnoreOptions;
use crate::library::LibraryDefinition;
use crate::models::{CONTENT_DESCRIPTOR, ContentId};
use crate::path::{PathResolver, validate as validate_path};
use crate::tree::TreeOps;
use crate::upload::{self, Rejection, UploadResult, ValidatedUpload};
use crate::StorageStrategy;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Local filesystem storage strategy.
///
/// # Examples
///
/// ```no_run
/// use h5p_storage::FileSystemStrategy;
///
/// let strategy = FileSystemStrategy::new("local", "/var/lib/h5p", None);
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemStrategy {
    name: String,
    resolver: PathResolver,
    tree: TreeOps,
    assets: AssetCache,
    ignore: IgnoreOptions,
}
impl FileSystemStrategy {
    /// Create a new filesystem strategy rooted at `base`, optionally keeping
    /// editor drafts somewhere other than `<base>/editor`.
    ///
    /// The standard directories are created if missing. Failing to create
    /// them is logged, not returned: they may well be provisioned
    /// out-of-band, and any real problem resurfaces on first use.
    pub fn new(name: impl Into<String>, base: impl Into<PathBuf>, editor: Option<PathBuf>) -> Self {
        let name = name.into();
        let resolver = PathResolver::new(base, editor);
        for directory in resolver.working_paths() {
            if directory.is_dir() {
                continue;
            }
            // Use non-async here; it only happens once on initialization and
            // it's not worth the hassle of making the constructor async.
            match sync_create_dir(&directory) {
                Ok(()) => tracing::info!(strategy = %name, directory = %directory.display(), "Created storage directory"),
                Err(e) => tracing::error!(
                    strategy = %name,
                    directory = %directory.display(),
                    error = %e,
                    "Could not create storage directory"
                ),
            }
        }
        let tree = TreeOps::new();
        Self {
            name,
            assets: AssetCache::new(resolver.clone(), tree),
            resolver,
            tree,
            ignore: IgnoreOptions::default(),
        }
    }

    /// Replace the default ignore rules used by every filtered copy.
    pub fn with_ignore(mut self, ignore: IgnoreOptions) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Delete-then-filtered-copy, shared by library and content saves.
    async fn replace(&self, source: &Path, target: &Path) -> Result<bool> {
        self.tree.delete(target).await?;
        self.tree.filtered_copy(source, target, &self.ignore).await
    }

    /// Content directory of `id`, or the draft area.
    fn resource_root(&self, id: Option<&ContentId>) -> Result<PathBuf> {
        match id {
            Some(id) => self.resolver.try_content_path(id),
            None => Ok(self.resolver.editor_path()),
        }
    }
}

#[async_trait]
impl StorageStrategy for FileSystemStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(strategy = %self.name, library = %library.as_string(false)))]
    async fn save_library(&self, library: &LibraryDefinition) -> Result<bool> {
        let target = self.resolver.library_path(library);
        let saved = self.replace(&library.upload_path(), &target).await?;
        if !saved {
            // A library directory that exists is taken as installed; don't
            // leave a partial one around.
            tracing::warn!("Stored library does not match upload, removing it");
            self.tree.delete(&target).await?;
        }
        Ok(saved)
    }

    #[instrument(skip_all, fields(strategy = %self.name, library = %library.as_string(false), target = %target.display()))]
    async fn export_library(
        &self,
        library: &LibraryDefinition,
        target: &Path,
        dev_override: Option<&Path>,
    ) -> Result<bool> {
        let source = match dev_override {
            Some(path) => path.to_path_buf(),
            None => self.resolver.library_path(library),
        };
        self.tree.filtered_copy(&source, &target.join(library.as_string(true)), &self.ignore).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, content = %id))]
    async fn save_content(&self, source: &Path, id: &ContentId) -> Result<bool> {
        let target = self.resolver.try_content_path(id)?;
        self.replace(source, &target).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, content = %id))]
    async fn delete_content(&self, id: &ContentId) -> Result<()> {
        self.tree.delete(&self.resolver.try_content_path(id)?).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, content = %id, new_content = %new_id))]
    async fn clone_content(&self, id: &ContentId, new_id: &ContentId) -> Result<bool> {
        let source = self.resolver.try_content_path(id)?;
        let target = self.resolver.try_content_path(new_id)?;
        self.tree.filtered_copy(&source, &target, &self.ignore).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, content = %id, target = %target.display()))]
    async fn export_content(&self, id: &ContentId, target: &Path) -> Result<bool> {
        let source = self.resolver.try_content_path(id)?;
        if !self.tree.exists(&source).await? {
            tracing::debug!("Content does not exist, exporting an empty directory");
            self.tree.ensure_dir(target).await?;
            return Ok(true);
        }
        self.tree.filtered_copy(&source, target, &self.ignore).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, source = source, output = output))]
    async fn save_export(&self, source: &str, output: &str) -> Result<bool> {
        let source = self.resolver.try_export_path(source)?;
        let output = self.resolver.try_export_path(output)?;
        if !self.tree.exists(&source).await? {
            tracing::warn!("Export source does not exist");
            return Ok(false);
        }
        if source == output {
            // Deleting the output first would destroy the only copy.
            return Ok(true);
        }
        self.tree.delete(&output).await?;
        self.tree.copy(&source, &output, false).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, export = name))]
    async fn delete_export(&self, name: &str) -> Result<()> {
        self.tree.delete(&self.resolver.try_export_path(name)?).await
    }

    async fn export_exists(&self, name: &str) -> Result<bool> {
        self.tree.exists(&self.resolver.try_export_path(name)?).await
    }

    async fn cache_assets(&self, bundle: &AssetBundle, key: &str) -> Result<Option<AssetBundle>> {
        self.assets.merge_and_cache(bundle, key).await
    }

    async fn get_cached_assets(&self, key: &str) -> Result<Option<AssetBundle>> {
        self.assets.get_cached(key).await
    }

    async fn delete_cached_assets(&self, keys: &[String]) -> Result<()> {
        self.assets.delete_cached(keys).await
    }

    #[instrument(skip_all, fields(strategy = %self.name, file = upload.name()))]
    async fn save_resource(&self, upload: &ValidatedUpload, id: Option<&ContentId>) -> Result<UploadResult> {
        let target = self.resource_root(id)?.join(upload.relative_path());
        match (upload.base64_data(), upload.temp_path()) {
            (Some(data), _) => self.tree.write(&target, &upload::decode_base64(data)?).await?,
            (None, Some(source)) => self.tree.copy_file(source, &target).await?,
            (None, None) => exn::bail!(ErrorKind::InvalidUpload(Rejection::MissingData)),
        }
        tracing::debug!(target = %target.display(), "Saved editor resource");
        Ok(upload.result())
    }

    #[instrument(skip_all, fields(strategy = %self.name, file = %file.display()))]
    async fn clone_content_resource_item(
        &self,
        file: &Path,
        from: Option<&ContentId>,
        to: &ContentId,
    ) -> Result<bool> {
        let file = validate_path(file)?;
        let source = self.resource_root(from)?.join(&file);
        let target = self.resolver.try_content_path(to)?.join(&file);
        if !self.tree.exists(&source).await? {
            tracing::warn!("Resource to clone does not exist");
            return Ok(false);
        }
        if !self.tree.exists(&target).await? {
            self.tree.copy_file(&source, &target).await?;
        }
        Ok(true)
    }

    #[instrument(skip_all, fields(strategy = %self.name))]
    async fn clone_content_resources(&self, from: Option<&ContentId>, to: &ContentId) -> Result<bool> {
        let source = self.resource_root(from)?;
        let target = self.resolver.try_content_path(to)?;
        if !self.tree.exists(&source).await? {
            return Ok(false);
        }
        let mut files = self.tree.walk(&source);
        let mut copied = 0usize;
        while let Some(relative) = files.try_next().await? {
            if relative == Path::new(CONTENT_DESCRIPTOR) {
                continue;
            }
            let destination = target.join(&relative);
            if self.tree.exists(&destination).await? {
                continue;
            }
            self.tree.copy_file(&source.join(&relative), &destination).await?;
            copied += 1;
        }
        tracing::debug!(copied, "Cloned content resources");
        Ok(true)
    }

    fn get_writable_temp_path(&self) -> PathBuf {
        self.tree.temp_path(self.resolver.base())
    }

    async fn is_path_writable(&self, path: &Path) -> bool {
        self.tree.is_writable(path).await
    }
}
