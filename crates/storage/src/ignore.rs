//! Ignore rules for packaging copies.
//!
//! Libraries and content are copied through a filter that drops repository
//! clutter and anything the package author asked to leave out. The rules are
//! file-level only: a directory is never excluded by itself, it just ends up
//! missing (or empty) when none of its files survive.
//!
//! Three rule sets make up [`IgnoreOptions`]:
//!
//! - `equal_to`: exact base names to drop;
//! - `has_extension`: extensions to drop, also matched against the full base
//!   name so that `.gitignore` catches both `.gitignore` and `lib.gitignore`;
//! - `is_listed_in`: manifest files at the source root whose lines are added
//!   to `equal_to` before filtering.

use crate::error::Result;
use crate::tree::TreeOps;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Name of the ignore manifest an author can drop at the root of a library.
pub const DEFAULT_MANIFEST: &str = ".h5pignore";

/// Rules deciding which files are left out of a filtered copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreOptions {
    pub equal_to: BTreeSet<String>,
    pub has_extension: BTreeSet<String>,
    pub is_listed_in: BTreeSet<String>,
}
impl Default for IgnoreOptions {
    fn default() -> Self {
        Self {
            equal_to: [".", ".."].map(String::from).into(),
            has_extension: [".git", ".gitignore", DEFAULT_MANIFEST].map(String::from).into(),
            is_listed_in: [DEFAULT_MANIFEST].map(String::from).into(),
        }
    }
}
impl IgnoreOptions {
    /// Whether a file with this base name should be left out.
    pub fn is_ignored(&self, file_name: &str) -> bool {
        if self.equal_to.contains(file_name) {
            return true;
        }
        let extension = Path::new(file_name).extension().and_then(|e| e.to_str());
        self.has_extension
            .iter()
            .any(|entry| entry == file_name || extension.is_some_and(|ext| ext == entry.trim_start_matches('.')))
    }
}

/// Outcome of [`compute_allowed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// Files to copy, relative to the source root, in listing order.
    pub allowed: Vec<PathBuf>,
    /// The options actually applied, after manifest entries were merged in.
    pub options: IgnoreOptions,
}

/// Computes which files under `root` survive `options`.
///
/// Manifests named in `is_listed_in` are read from the root before anything
/// is filtered, even when the manifest itself is excluded by another rule.
/// Every non-empty line of a manifest becomes an exact-name entry.
pub async fn compute_allowed(tree: &TreeOps, root: &Path, options: &IgnoreOptions) -> Result<Filtered> {
    let mut options = options.clone();
    for manifest in &options.is_listed_in {
        let path = root.join(manifest);
        if !tree.exists(&path).await? {
            continue;
        }
        let listed = tree.read_text(&path).await?;
        let before = options.equal_to.len();
        options.equal_to.extend(listed.lines().filter(|line| !line.is_empty()).map(String::from));
        tracing::debug!(manifest = %manifest, added = options.equal_to.len() - before, "Merged ignore manifest");
    }

    let allowed = tree
        .list_files_recursive(root)
        .await?
        .into_iter()
        .filter(|file| match file.file_name().and_then(|n| n.to_str()) {
            Some(name) => !options.is_ignored(name),
            // Non-UTF-8 names can't match any rule.
            None => true,
        })
        .collect();
    Ok(Filtered { allowed, options })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("library.json", false)]
    #[case("lib.gitignore", true)]
    #[case(".gitignore", true)]
    #[case(".git", true)]
    #[case(".h5pignore", true)]
    #[case("notes.h5pignore", true)]
    #[case("gitignore.js", false)]
    #[case("git", false)]
    #[case(".", true)]
    fn default_rules(#[case] name: &str, #[case] ignored: bool) {
        assert_eq!(IgnoreOptions::default().is_ignored(name), ignored, "file {name:?}");
    }

    #[tokio::test]
    async fn manifest_augments_exact_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        let root = temp_dir.path();
        tree.write_text(&root.join(DEFAULT_MANIFEST), "foo.txt\n\nsecret.json\n").await.unwrap();
        tree.write_text(&root.join("foo.txt"), "ignored").await.unwrap();
        tree.write_text(&root.join("nested/foo.txt"), "ignored too").await.unwrap();
        tree.write_text(&root.join("keep.txt"), "kept").await.unwrap();

        let filtered = compute_allowed(&tree, root, &IgnoreOptions::default()).await.unwrap();
        assert_eq!(filtered.allowed, vec![PathBuf::from("keep.txt")]);
        assert!(filtered.options.equal_to.contains("foo.txt"));
        assert!(filtered.options.equal_to.contains("secret.json"));
        assert!(!filtered.options.equal_to.contains(""));
    }

    #[tokio::test]
    async fn manifest_accepts_windows_line_endings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join(DEFAULT_MANIFEST), "a.txt\r\nb.txt\r\n").await.unwrap();
        let filtered = compute_allowed(&tree, temp_dir.path(), &IgnoreOptions::default()).await.unwrap();
        assert!(filtered.options.equal_to.contains("a.txt"));
        assert!(filtered.options.equal_to.contains("b.txt"));
    }

    #[tokio::test]
    async fn without_manifest_options_are_unchanged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join("a.js"), "A").await.unwrap();
        tree.write_text(&temp_dir.path().join(".git"), "gitdir: ../x").await.unwrap();
        let filtered = compute_allowed(&tree, temp_dir.path(), &IgnoreOptions::default()).await.unwrap();
        assert_eq!(filtered.options, IgnoreOptions::default());
        assert_eq!(filtered.allowed, vec![PathBuf::from("a.js")]);
    }

    #[tokio::test]
    async fn custom_manifest_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join("IGNORE"), "b.js").await.unwrap();
        tree.write_text(&temp_dir.path().join("a.js"), "A").await.unwrap();
        tree.write_text(&temp_dir.path().join("b.js"), "B").await.unwrap();
        let options = IgnoreOptions {
            is_listed_in: ["IGNORE".to_string()].into(),
            ..Default::default()
        };
        let filtered = compute_allowed(&tree, temp_dir.path(), &options).await.unwrap();
        // The manifest itself is not excluded unless another rule says so.
        assert_eq!(filtered.allowed, vec![PathBuf::from("IGNORE"), PathBuf::from("a.js")]);
    }
}
