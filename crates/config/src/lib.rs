//! Configuration for H5P storage.
//!
//! Sources, lowest to highest priority:
//!
//! 1. built-in defaults (base path in the platform data directory),
//! 2. `h5p.toml`, `h5p.yaml` and `h5p.json` in the working directory or one
//!    of its parents (or a single explicit file, see [`Config::load_file`]),
//! 3. `H5P_`-prefixed environment variables (`H5P_BASE_PATH`,
//!    `H5P_EDITOR_PATH`, `H5P_NAME`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use h5p_storage::ignore::IgnoreOptions;
use h5p_storage::{FileSystemStrategy, StorageManager};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ENV_PREFIX: &str = "H5P_";
const FILE_STEM: &str = "h5p";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Strategy name, used in logs.
    pub name: String,
    /// Root of the storage layout. Must be absolute.
    pub base_path: PathBuf,
    /// Where editor drafts live; `<base_path>/editor` when unset.
    pub editor_path: Option<PathBuf>,
    /// Rules applied to every filtered copy.
    pub ignore: IgnoreOptions,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            base_path: PathBuf::new(),
            editor_path: None,
            ignore: IgnoreOptions::default(),
        }
    }
}
impl Config {
    /// Loads from the default files in the working directory and the
    /// environment.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(format!("{FILE_STEM}.toml")))
            .merge(Yaml::file(format!("{FILE_STEM}.yaml")))
            .merge(Json::file(format!("{FILE_STEM}.json")));
        Self::extract(figment)
    }

    /// Loads from one explicit file, format picked by extension, then the
    /// environment. Unlike [`load()`](Self::load), the file must exist.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            exn::bail!(ErrorKind::Invalid(format!("configuration file {} does not exist", path.display())));
        }
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Figment::new().merge(Toml::file_exact(path)),
            Some("yaml" | "yml") => Figment::new().merge(Yaml::file_exact(path)),
            Some("json") => Figment::new().merge(Json::file_exact(path)),
            _ => exn::bail!(ErrorKind::Invalid(format!("unsupported configuration format: {}", path.display()))),
        };
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let mut config: Config = figment.merge(Env::prefixed(ENV_PREFIX)).extract().map_err(ErrorKind::from)?;
        if config.base_path.as_os_str().is_empty() {
            config.base_path = default_base_path()?;
        }
        config.validate()?;
        tracing::debug!(base_path = %config.base_path.display(), "Loaded storage configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_path.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!("base path must be absolute: {}", self.base_path.display())));
        }
        if let Some(editor) = &self.editor_path
            && !editor.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid(format!("editor path must be absolute: {}", editor.display())));
        }
        if self.name.is_empty() {
            exn::bail!(ErrorKind::Invalid("strategy name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn strategy(&self) -> FileSystemStrategy {
        FileSystemStrategy::new(&self.name, &self.base_path, self.editor_path.clone()).with_ignore(self.ignore.clone())
    }

    pub fn manager(&self) -> StorageManager {
        StorageManager::new(Arc::new(self.strategy()))
    }
}

fn default_base_path() -> Result<PathBuf> {
    match ProjectDirs::from("org", "H5P", FILE_STEM) {
        Some(dirs) => Ok(dirs.data_dir().to_path_buf()),
        None => exn::bail!(ErrorKind::NoHomeDirectory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_env_overrides_files() {
        Jail::expect_with(|jail| {
            jail.create_file("h5p.toml", "base_path = \"/srv/toml\"\nname = \"toml\"")?;
            jail.create_file("h5p.json", r#"{ "base_path": "/srv/json" }"#)?;
            let config = Config::load().unwrap();
            assert_eq!(config.base_path, Path::new("/srv/json"));
            assert_eq!(config.name, "toml");

            jail.set_env("H5P_BASE_PATH", "/srv/env");
            jail.set_env("H5P_EDITOR_PATH", "/srv/drafts");
            let config = Config::load().unwrap();
            assert_eq!(config.base_path, Path::new("/srv/env"));
            assert_eq!(config.editor_path.as_deref(), Some(Path::new("/srv/drafts")));
            Ok(())
        });
    }

    #[test]
    fn test_ignore_rules_from_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "h5p.yaml",
                "base_path: /srv/h5p\nignore:\n  equal_to: [\"Thumbs.db\"]\n  has_extension: [\".map\"]\n",
            )?;
            let config = Config::load().unwrap();
            assert!(config.ignore.is_ignored("Thumbs.db"));
            assert!(config.ignore.is_ignored("bundle.js.map"));
            // Unset rule sets keep their defaults.
            assert_eq!(config.ignore.is_listed_in, IgnoreOptions::default().is_listed_in);
            Ok(())
        });
    }

    #[test]
    fn test_relative_base_path_is_invalid() {
        Jail::expect_with(|jail| {
            jail.set_env("H5P_BASE_PATH", "relative/storage");
            let err = Config::load().unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("h5p.toml", "base_path = \"/srv/explicit\"")]
    #[case("h5p.yml", "base_path: /srv/explicit")]
    #[case("h5p.json", r#"{ "base_path": "/srv/explicit" }"#)]
    fn test_load_explicit_file(#[case] name: &str, #[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        assert_eq!(Config::load_file(&path).unwrap().base_path, Path::new("/srv/explicit"));
    }

    #[test]
    fn test_load_explicit_file_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(Config::load_file(&temp_dir.path().join("missing.toml")).is_err());
        let ini = temp_dir.path().join("h5p.ini");
        std::fs::write(&ini, "base_path=/srv").unwrap();
        let err = Config::load_file(&ini).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
        let broken = temp_dir.path().join("h5p.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(&*Config::load_file(&broken).unwrap_err(), ErrorKind::Load(_)));
    }

    #[test]
    fn test_builds_strategy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config { base_path: temp_dir.path().to_path_buf(), ..Default::default() };
        config.validate().unwrap();
        let manager = config.manager();
        assert_eq!(manager.strategy().name(), "local");
        assert!(temp_dir.path().join("libraries").is_dir());
        assert!(temp_dir.path().join("editor").is_dir());
    }
}
