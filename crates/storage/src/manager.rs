//! The storage entry point handed to the rest of the application.

use crate::assets::AssetBundle;
use crate::error::Result;
use crate::library::LibraryDefinition;
use crate::models::ContentId;
use crate::upload::{UploadResult, ValidatedUpload};
use crate::StrategyHandle;
use std::path::{Path, PathBuf};

/// Thin façade over whichever [`StorageStrategy`](crate::StorageStrategy) was injected at
/// construction. Cloning is cheap and shares the strategy.
///
/// ```
/// use h5p_storage::{FileSystemStrategy, StorageManager};
/// use std::sync::Arc;
///
/// let temp_dir = tempfile::tempdir().unwrap();
/// let manager = StorageManager::new(Arc::new(FileSystemStrategy::new("local", temp_dir.path(), None)));
/// assert_eq!(manager.strategy().name(), "local");
/// ```
#[derive(Clone)]
pub struct StorageManager {
    strategy: StrategyHandle,
}
impl StorageManager {
    pub fn new(strategy: StrategyHandle) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &StrategyHandle {
        &self.strategy
    }

    /// A manager over a different strategy; this one is left untouched.
    pub fn with_strategy(&self, strategy: StrategyHandle) -> Self {
        tracing::debug!(from = self.strategy.name(), to = strategy.name(), "Switching storage strategy");
        Self::new(strategy)
    }

    pub async fn save_library(&self, library: &LibraryDefinition) -> Result<bool> {
        self.strategy.save_library(library).await
    }

    pub async fn export_library(
        &self,
        library: &LibraryDefinition,
        target: &Path,
        dev_override: Option<&Path>,
    ) -> Result<bool> {
        self.strategy.export_library(library, target, dev_override).await
    }

    pub async fn save_content(&self, source: &Path, id: &ContentId) -> Result<bool> {
        self.strategy.save_content(source, id).await
    }

    pub async fn delete_content(&self, id: &ContentId) -> Result<()> {
        self.strategy.delete_content(id).await
    }

    pub async fn clone_content(&self, id: &ContentId, new_id: &ContentId) -> Result<bool> {
        self.strategy.clone_content(id, new_id).await
    }

    pub async fn export_content(&self, id: &ContentId, target: &Path) -> Result<bool> {
        self.strategy.export_content(id, target).await
    }

    pub async fn save_export(&self, source: &str, output: &str) -> Result<bool> {
        self.strategy.save_export(source, output).await
    }

    pub async fn delete_export(&self, name: &str) -> Result<()> {
        self.strategy.delete_export(name).await
    }

    pub async fn export_exists(&self, name: &str) -> Result<bool> {
        self.strategy.export_exists(name).await
    }

    pub async fn cache_assets(&self, bundle: &AssetBundle, key: &str) -> Result<Option<AssetBundle>> {
        self.strategy.cache_assets(bundle, key).await
    }

    pub async fn get_cached_assets(&self, key: &str) -> Result<Option<AssetBundle>> {
        self.strategy.get_cached_assets(key).await
    }

    pub async fn delete_cached_assets(&self, keys: &[String]) -> Result<()> {
        self.strategy.delete_cached_assets(keys).await
    }

    pub async fn save_resource(&self, upload: &ValidatedUpload, id: Option<&ContentId>) -> Result<UploadResult> {
        self.strategy.save_resource(upload, id).await
    }

    pub async fn clone_content_resource_item(
        &self,
        file: &Path,
        from: Option<&ContentId>,
        to: &ContentId,
    ) -> Result<bool> {
        self.strategy.clone_content_resource_item(file, from, to).await
    }

    pub async fn clone_content_resources(&self, from: Option<&ContentId>, to: &ContentId) -> Result<bool> {
        self.strategy.clone_content_resources(from, to).await
    }

    pub fn get_writable_temp_path(&self) -> PathBuf {
        self.strategy.get_writable_temp_path()
    }

    pub async fn is_path_writable(&self, path: &Path) -> bool {
        self.strategy.is_path_writable(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileSystemStrategy;
    use crate::tree::TreeOps;
    use std::sync::Arc;

    fn manager(base: &Path, name: &str) -> StorageManager {
        StorageManager::new(Arc::new(FileSystemStrategy::new(name, base, None)))
    }

    #[tokio::test]
    async fn test_forwards_to_strategy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        let manager = manager(temp_dir.path(), "local");
        let draft = temp_dir.path().join("draft");
        tree.write_text(&draft.join("content.json"), "{}").await.unwrap();

        let id = ContentId::from(1);
        assert!(manager.save_content(&draft, &id).await.unwrap());
        assert!(tree.exists(&temp_dir.path().join("content/1/content.json")).await.unwrap());
        manager.delete_content(&id).await.unwrap();
        assert!(!tree.exists(&temp_dir.path().join("content/1")).await.unwrap());
        assert!(manager.get_writable_temp_path().starts_with(temp_dir.path()));
    }

    #[tokio::test]
    async fn test_with_strategy_leaves_original_alone() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let original = manager(first.path(), "first");
        let switched = original.with_strategy(Arc::new(FileSystemStrategy::new("second", second.path(), None)));
        assert_eq!(original.strategy().name(), "first");
        assert_eq!(switched.strategy().name(), "second");

        let tree = TreeOps::new();
        tree.write_text(&second.path().join("exports/x.h5p"), "zip").await.unwrap();
        assert!(switched.export_exists("x.h5p").await.unwrap());
        assert!(!original.export_exists("x.h5p").await.unwrap());
    }
}
