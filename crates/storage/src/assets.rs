//! Cached asset aggregation.
//!
//! Content pages preload every script and stylesheet of every library they
//! depend on. [`AssetCache`] concatenates those into one `.js` and one `.css`
//! file per cache key (a hash of the dependency set, supplied by the caller)
//! so the browser makes two requests instead of dozens.
//!
//! Stylesheets need their relative `url(...)` references rewritten: the
//! aggregate lives in `cachedassets/`, one level below the storage base,
//! while the original stylesheet lived somewhere under `libraries/`.

use crate::error::Result;
use crate::path::{PathResolver, validate as validate_path};
use crate::tree::TreeOps;
use futures::future::try_join_all;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::instrument;

static CSS_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)url\(['"]?([^"')]+)['"]?\)"#).unwrap());
static NON_RELATIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(data:|([a-z0-9]+:)?/)").unwrap());

/// The two kinds of aggregated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Scripts,
    Styles,
}
impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Scripts, AssetKind::Styles];

    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Scripts => "js",
            AssetKind::Styles => "css",
        }
    }
}

/// A single script or stylesheet, relative to the storage base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    pub path: String,
    #[serde(default)]
    pub version: String,
}
impl AssetReference {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self { path: path.into(), version: version.into() }
    }
}

/// Ordered scripts and styles required to display a piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetBundle {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<AssetReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<AssetReference>,
}
impl AssetBundle {
    pub fn get(&self, kind: AssetKind) -> &[AssetReference] {
        match kind {
            AssetKind::Scripts => &self.scripts,
            AssetKind::Styles => &self.styles,
        }
    }

    fn set(&mut self, kind: AssetKind, references: Vec<AssetReference>) {
        match kind {
            AssetKind::Scripts => self.scripts = references,
            AssetKind::Styles => self.styles = references,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.styles.is_empty()
    }
}

/// Merges asset bundles into per-key aggregate files under `cachedassets/`.
#[derive(Debug, Clone)]
pub struct AssetCache {
    resolver: PathResolver,
    tree: TreeOps,
}
impl AssetCache {
    pub fn new(resolver: PathResolver, tree: TreeOps) -> Self {
        Self { resolver, tree }
    }

    /// Concatenates each non-empty kind of `bundle` into a single aggregate
    /// file for `key` and returns a bundle pointing at the aggregates.
    ///
    /// References that don't exist are skipped with a warning. Reads run
    /// concurrently, output order always follows declaration order. Returns
    /// `None` when no kind produced an aggregate.
    #[instrument(skip_all, fields(key = key))]
    pub async fn merge_and_cache(&self, bundle: &AssetBundle, key: &str) -> Result<Option<AssetBundle>> {
        let mut cached = AssetBundle::default();
        for kind in AssetKind::ALL {
            let references = bundle.get(kind);
            if references.is_empty() {
                continue;
            }
            let target = self.resolver.try_cached_asset_path(key, kind)?;
            let contents = try_join_all(references.iter().map(|reference| self.load(reference))).await?;
            let mut merged = String::new();
            for (reference, content) in references.iter().zip(contents) {
                let Some(content) = content else { continue };
                match kind {
                    AssetKind::Scripts => merged.push_str(&content),
                    AssetKind::Styles => {
                        merged.push_str(&rewrite_css_urls(&content, &reference.path));
                        merged.push('\n');
                    },
                }
            }
            self.tree.write_text(&target, &merged).await?;
            tracing::debug!(kind = kind.extension(), files = references.len(), bytes = merged.len(), "Cached assets");
            cached.set(kind, vec![AssetReference::new(target.to_string_lossy(), "")]);
        }
        Ok((!cached.is_empty()).then_some(cached))
    }

    /// Returns whichever aggregates already exist for `key`, or `None` if
    /// neither does.
    pub async fn get_cached(&self, key: &str) -> Result<Option<AssetBundle>> {
        let mut cached = AssetBundle::default();
        for kind in AssetKind::ALL {
            let path = self.resolver.try_cached_asset_path(key, kind)?;
            if self.tree.exists(&path).await? {
                cached.set(kind, vec![AssetReference::new(path.to_string_lossy(), "")]);
            }
        }
        Ok((!cached.is_empty()).then_some(cached))
    }

    /// Removes both aggregates of every key, where present.
    pub async fn delete_cached(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            for kind in AssetKind::ALL {
                self.tree.delete(&self.resolver.try_cached_asset_path(key, kind)?).await?;
            }
        }
        Ok(())
    }

    async fn load(&self, reference: &AssetReference) -> Result<Option<String>> {
        let path = self.resolver.base().join(validate_path(&reference.path)?);
        if !self.tree.exists(&path).await? {
            tracing::warn!(path = %reference.path, "Asset passed to cache does not exist");
            return Ok(None);
        }
        // Browsers are lenient about stray bytes in scripts and stylesheets;
        // one badly encoded file must not fail the whole aggregate.
        let bytes = self.tree.read(&path).await?;
        Ok(Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %reference.path, "Asset is not valid UTF-8, replacing invalid bytes");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            },
        }))
    }
}

/// Rewrites every relative `url(...)` in a stylesheet so it still resolves
/// from `cachedassets/`. `css_path` is the stylesheet's path relative to the
/// storage base; data URIs, absolute paths and URLs with a scheme are left
/// untouched.
///
/// ```
/// use h5p_storage::assets::rewrite_css_urls;
/// assert_eq!(
///     rewrite_css_urls("a { background: url(img/x.png) }", "styles/theme.css"),
///     r#"a { background: url("../styles/img/x.png") }"#,
/// );
/// ```
pub fn rewrite_css_urls(css: &str, css_path: &str) -> String {
    let directory = match css_path.rsplit_once('/') {
        Some((directory, _)) => format!("{directory}/"),
        None => String::new(),
    };
    CSS_URL_REGEX
        .replace_all(css, |captures: &Captures| {
            let url = &captures[1];
            match NON_RELATIVE_REGEX.is_match(url) {
                true => captures[0].to_string(),
                false => format!(r#"url("../{directory}{url}")"#),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::Path;

    fn cache(base: &Path) -> AssetCache {
        AssetCache::new(PathResolver::new(base, None), TreeOps::new())
    }

    #[rstest]
    #[case("url(img/x.png)", r#"url("../styles/img/x.png")"#)]
    #[case("url('img/x.png')", r#"url("../styles/img/x.png")"#)]
    #[case(r#"url("fonts/a.woff")"#, r#"url("../styles/fonts/a.woff")"#)]
    #[case("URL(img/x.png)", r#"url("../styles/img/x.png")"#)]
    #[case("url(data:image/png;base64,AAAA)", "url(data:image/png;base64,AAAA)")]
    #[case("url(https://cdn/x.png)", "url(https://cdn/x.png)")]
    #[case("url(//cdn/x.png)", "url(//cdn/x.png)")]
    #[case("url(/static/x.png)", "url(/static/x.png)")]
    fn rewrites_only_relative_urls(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(rewrite_css_urls(input, "styles/theme.css"), expected);
    }

    #[test]
    fn rewrites_every_occurrence() {
        let css = ".a { background: url(a.png) } .b { background: url(../b.png) }";
        assert_eq!(
            rewrite_css_urls(css, "libraries/H5P.Foo-1.0/css/foo.css"),
            r#".a { background: url("../libraries/H5P.Foo-1.0/css/a.png") } .b { background: url("../libraries/H5P.Foo-1.0/css/../b.png") }"#
        );
        assert_eq!(rewrite_css_urls("url(a.png)", "root.css"), r#"url("../a.png")"#);
    }

    #[tokio::test]
    async fn scripts_concatenate_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join("a.js"), "A").await.unwrap();
        tree.write_text(&temp_dir.path().join("b.js"), "B").await.unwrap();
        let bundle = AssetBundle {
            scripts: vec![AssetReference::new("a.js", "1"), AssetReference::new("b.js", "1")],
            styles: vec![],
        };

        let cached = cache(temp_dir.path()).merge_and_cache(&bundle, "my-key").await.unwrap().unwrap();
        let target = temp_dir.path().join("cachedassets/my-key.js");
        assert_eq!(tree.read_text(&target).await.unwrap(), "AB");
        assert_eq!(cached.scripts, vec![AssetReference::new(target.to_string_lossy(), "")]);
        assert!(cached.styles.is_empty());
        assert!(!tree.exists(&temp_dir.path().join("cachedassets/my-key.css")).await.unwrap());
    }

    #[tokio::test]
    async fn styles_are_rewritten_and_newline_terminated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join("styles/theme.css"), "a{background:url(img/x.png)}").await.unwrap();
        tree.write_text(&temp_dir.path().join("styles/more.css"), "b{}").await.unwrap();
        let bundle = AssetBundle {
            scripts: vec![],
            styles: vec![AssetReference::new("styles/theme.css", "1"), AssetReference::new("styles/more.css", "1")],
        };

        cache(temp_dir.path()).merge_and_cache(&bundle, "k").await.unwrap().unwrap();
        let merged = tree.read_text(&temp_dir.path().join("cachedassets/k.css")).await.unwrap();
        assert_eq!(merged, "a{background:url(\"../styles/img/x.png\")}\nb{}\n");
    }

    #[tokio::test]
    async fn order_does_not_depend_on_read_completion() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        let large = "L".repeat(4 * 1024 * 1024);
        tree.write_text(&temp_dir.path().join("large.js"), &large).await.unwrap();
        tree.write_text(&temp_dir.path().join("small.js"), "S").await.unwrap();
        let bundle = AssetBundle {
            scripts: vec![AssetReference::new("large.js", "1"), AssetReference::new("small.js", "1")],
            styles: vec![],
        };
        cache(temp_dir.path()).merge_and_cache(&bundle, "k").await.unwrap().unwrap();
        let merged = tree.read_text(&temp_dir.path().join("cachedassets/k.js")).await.unwrap();
        assert_eq!(merged.len(), large.len() + 1);
        assert!(merged.starts_with(&large));
        assert!(merged.ends_with('S'));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write(&temp_dir.path().join("libraries/x/a.css"), b"/* caf\xe9 */ a{color:red}").await.unwrap();
        tree.write_text(&temp_dir.path().join("libraries/x/a.js"), "A").await.unwrap();
        let bundle = AssetBundle {
            scripts: vec![AssetReference::new("libraries/x/a.js", "1")],
            styles: vec![AssetReference::new("libraries/x/a.css", "1")],
        };

        let cached = cache(temp_dir.path()).merge_and_cache(&bundle, "k").await.unwrap().unwrap();
        assert_eq!(cached.scripts.len(), 1);
        assert_eq!(cached.styles.len(), 1);
        let css = tree.read_text(&temp_dir.path().join("cachedassets/k.css")).await.unwrap();
        assert_eq!(css, "/* caf\u{fffd} */ a{color:red}\n");
        assert_eq!(tree.read_text(&temp_dir.path().join("cachedassets/k.js")).await.unwrap(), "A");
    }

    #[tokio::test]
    async fn missing_references_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        tree.write_text(&temp_dir.path().join("b.js"), "B").await.unwrap();
        let bundle = AssetBundle {
            scripts: vec![AssetReference::new("missing.js", "1"), AssetReference::new("b.js", "1")],
            styles: vec![],
        };
        cache(temp_dir.path()).merge_and_cache(&bundle, "k").await.unwrap().unwrap();
        assert_eq!(tree.read_text(&temp_dir.path().join("cachedassets/k.js")).await.unwrap(), "B");
    }

    #[tokio::test]
    async fn empty_bundle_produces_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = cache(temp_dir.path()).merge_and_cache(&AssetBundle::default(), "k").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn get_and_delete_cached() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = TreeOps::new();
        let cache = cache(temp_dir.path());
        assert!(cache.get_cached("abc123").await.unwrap().is_none());

        tree.write_text(&temp_dir.path().join("cachedassets/abc123.js"), "A").await.unwrap();
        let cached = cache.get_cached("abc123").await.unwrap().unwrap();
        assert_eq!(cached.scripts.len(), 1);
        assert!(cached.styles.is_empty());

        tree.write_text(&temp_dir.path().join("cachedassets/abc123.css"), "a{}").await.unwrap();
        let cached = cache.get_cached("abc123").await.unwrap().unwrap();
        assert_eq!(cached.styles.len(), 1);

        cache.delete_cached(&["abc123".to_string(), "never-cached".to_string()]).await.unwrap();
        assert!(cache.get_cached("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_cannot_escape_cache_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bundle = AssetBundle { scripts: vec![AssetReference::new("a.js", "")], styles: vec![] };
        assert!(cache(temp_dir.path()).merge_and_cache(&bundle, "../escape").await.is_err());
    }

    #[test]
    fn bundle_serializes_like_the_front_end_expects() {
        let bundle = AssetBundle { scripts: vec![AssetReference::new("a.js", "1.0")], styles: vec![] };
        assert_eq!(serde_json::to_string(&bundle).unwrap(), r#"{"scripts":[{"path":"a.js","version":"1.0"}]}"#);
        let parsed: AssetBundle = serde_json::from_str(r#"{"styles":[{"path":"b.css"}]}"#).unwrap();
        assert_eq!(parsed.styles, vec![AssetReference::new("b.css", "")]);
    }
}
